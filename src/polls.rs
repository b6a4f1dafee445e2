use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Extension, Json, Path},
    http::{HeaderMap, StatusCode, header::CACHE_CONTROL},
    response::IntoResponse,
};
use serde::Deserialize;
use tower_cookies::Cookies;
use tracing::{debug, info};

use crate::error::PollError;
use crate::model::PollEnvelope;
use crate::socket::RoomUpdate;
use crate::startup::AppState;
use crate::store::{PollStore, VoteRejection};
use crate::voter::{VoterIdentity, identify};

const MAX_QUESTION_CHARS: usize = 500;
const MAX_OPTION_CHARS: usize = 200;
const MIN_OPTIONS: usize = 2;
const MAX_OPTIONS: usize = 10;

// Request DTOs
#[derive(Debug, Deserialize)]
pub struct CreatePollRequest {
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub options: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastVoteRequest {
    #[serde(default)]
    pub option_id: Option<String>,
}

/// Trims and checks a new poll, returning the cleaned question and options.
pub fn validate_poll_input(
    question: Option<&str>,
    options: Option<&[String]>,
) -> Result<(String, Vec<String>), PollError> {
    let question = question.unwrap_or_default().trim();
    if question.is_empty() {
        return Err(PollError::InvalidRequest("Question is required.".to_string()));
    }
    if question.chars().count() > MAX_QUESTION_CHARS {
        return Err(PollError::InvalidRequest(
            "Question is too long. Max 500 characters.".to_string(),
        ));
    }

    let Some(options) = options else {
        return Err(PollError::InvalidRequest("Options must be a list.".to_string()));
    };
    let options: Vec<String> = options
        .iter()
        .map(|option| option.trim())
        .filter(|option| !option.is_empty())
        .map(str::to_string)
        .collect();

    if options.len() < MIN_OPTIONS {
        return Err(PollError::InvalidRequest(
            "At least 2 non-empty options are required.".to_string(),
        ));
    }
    if options.len() > MAX_OPTIONS {
        return Err(PollError::InvalidRequest(
            "At most 10 options are allowed.".to_string(),
        ));
    }
    if options
        .iter()
        .any(|option| option.chars().count() > MAX_OPTION_CHARS)
    {
        return Err(PollError::InvalidRequest(
            "Each option must be at most 200 characters.".to_string(),
        ));
    }

    let mut lowered: Vec<String> = options.iter().map(|option| option.to_lowercase()).collect();
    lowered.sort();
    lowered.dedup();
    if lowered.len() != options.len() {
        return Err(PollError::InvalidRequest("Options must be unique.".to_string()));
    }

    Ok((question.to_string(), options))
}

fn envelope(
    store: &PollStore,
    app_state: &AppState,
    poll_id: &str,
    voter: &VoterIdentity,
) -> Result<PollEnvelope, PollError> {
    let poll = store.snapshot(poll_id).ok_or(PollError::PollNotFound)?;
    Ok(PollEnvelope {
        share_url: app_state.config.share_url(poll_id),
        viewer: store.viewer_state(poll_id, &voter.token_hash, &voter.ip_hash),
        poll,
    })
}

fn voter_for(
    app_state: &AppState,
    cookies: &Cookies,
    headers: &HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
) -> VoterIdentity {
    identify(
        cookies,
        &app_state.cookie_key,
        headers,
        peer.map(|ConnectInfo(addr)| addr),
        &app_state.config,
    )
}

/// Create a new poll
pub async fn create_poll(
    Extension(app_state): Extension<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    Json(payload): Json<CreatePollRequest>,
) -> Result<impl IntoResponse, PollError> {
    let voter = voter_for(&app_state, &cookies, &headers, peer);
    let (question, options) =
        validate_poll_input(payload.question.as_deref(), payload.options.as_deref())?;

    let mut store = app_state.store.write().await;
    let poll = store.create_poll(&question, &options);
    info!(poll_id = %poll.id, options = options.len(), "poll created");

    let response = envelope(&store, &app_state, &poll.id, &voter)?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Get a poll with its tallies and the caller's vote
pub async fn get_poll(
    Extension(app_state): Extension<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    Path(poll_id): Path<String>,
) -> Result<impl IntoResponse, PollError> {
    let voter = voter_for(&app_state, &cookies, &headers, peer);

    let store = app_state.store.read().await;
    let response = envelope(&store, &app_state, &poll_id, &voter)?;

    Ok(([(CACHE_CONTROL, "no-store")], Json(response)))
}

/// Cast a vote, once per browser token and once per network
pub async fn vote_on_poll(
    Extension(app_state): Extension<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    Path(poll_id): Path<String>,
    Json(payload): Json<CastVoteRequest>,
) -> Result<impl IntoResponse, PollError> {
    let voter = voter_for(&app_state, &cookies, &headers, peer);

    let mut store = app_state.store.write().await;
    if store.get_poll(&poll_id).is_none() {
        return Err(PollError::PollNotFound);
    }

    let option_id = payload.option_id.unwrap_or_default().trim().to_string();
    if option_id.is_empty() {
        return Err(PollError::InvalidRequest("optionId is required.".to_string()));
    }

    match store.cast_vote(&poll_id, &option_id, &voter.token_hash, &voter.ip_hash) {
        Ok(()) => {}
        Err(VoteRejection::UnknownPoll) => return Err(PollError::PollNotFound),
        Err(VoteRejection::UnknownOption) => return Err(PollError::InvalidOption),
        Err(rejection @ (VoteRejection::SameBrowser | VoteRejection::SameNetwork)) => {
            debug!(%poll_id, ?rejection, "duplicate vote refused");
            return Err(PollError::AlreadyVoted {
                message: rejection.message().to_string(),
                state: Box::new(envelope(&store, &app_state, &poll_id, &voter)?),
            });
        }
    }

    let response = envelope(&store, &app_state, &poll_id, &voter)?;
    // Broadcast before releasing the lock so room updates keep commit order.
    let _ = app_state.rooms.send(RoomUpdate {
        poll_id: poll_id.clone(),
        snapshot: response.poll.clone(),
    });
    drop(store);

    info!(%poll_id, total_votes = response.poll.total_votes, "vote recorded");
    Ok((StatusCode::CREATED, Json(response)))
}
