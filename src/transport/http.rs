use std::sync::Arc;

use reqwest::{StatusCode, Url, header::CACHE_CONTROL};
use serde_json::{Value, json};
use tracing::debug;

use super::{ErrorHandler, PollTransport, Subscription, UpdateHandler, room_listener};
use crate::config::ClientConfig;
use crate::error::TransportError;
use crate::model::PollEnvelope;

/// HTTP + WebSocket client for one poll server.
///
/// Requests go through a cookie store so the server's fairness cookie is
/// replayed on every call; the client never reads it.
#[derive(Clone)]
pub struct PollClient {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    Create,
    Load,
    Vote,
}

impl PollClient {
    pub fn new(config: ClientConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.request_timeout)
            .build()?;

        Ok(PollClient::with_http(config, http))
    }

    /// Uses a caller-built `reqwest::Client`, e.g. one sharing a cookie jar
    /// with another client.
    pub fn with_http(config: ClientConfig, http: reqwest::Client) -> Self {
        PollClient {
            http,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// `{base}/api/polls/{poll_id}[/{tail}]`, with the poll id escaped as a
    /// single path segment.
    fn poll_url(&self, poll_id: &str, tail: Option<&str>) -> Result<Url, TransportError> {
        let mut url = Url::parse(&self.config.polls_url())
            .map_err(|e| TransportError::Network(format!("invalid poll server URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| TransportError::Network("poll server URL cannot hold a path".to_string()))?
            .push(poll_id)
            .extend(tail);
        Ok(url)
    }

    pub async fn create_poll(
        &self,
        question: &str,
        options: &[String],
    ) -> Result<PollEnvelope, TransportError> {
        let response = self
            .http
            .post(self.config.polls_url())
            .json(&json!({ "question": question, "options": options }))
            .send()
            .await?;

        parse_response(response, Call::Create).await
    }
}

impl PollTransport for PollClient {
    async fn load_poll(&self, poll_id: &str) -> Result<PollEnvelope, TransportError> {
        let response = self
            .http
            .get(self.poll_url(poll_id, None)?)
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await?;

        parse_response(response, Call::Load).await
    }

    async fn submit_vote(
        &self,
        poll_id: &str,
        option_id: &str,
    ) -> Result<PollEnvelope, TransportError> {
        let response = self
            .http
            .post(self.poll_url(poll_id, Some("vote"))?)
            .json(&json!({ "optionId": option_id }))
            .send()
            .await?;

        parse_response(response, Call::Vote).await
    }

    fn subscribe(
        &self,
        poll_id: &str,
        on_update: UpdateHandler,
        on_error: ErrorHandler,
    ) -> Subscription {
        room_listener::spawn(
            room_listener::RoomTarget {
                socket_url: self.config.socket_url.clone(),
                poll_id: poll_id.to_string(),
                reconnect_initial: self.config.reconnect_initial,
                reconnect_max: self.config.reconnect_max,
            },
            on_update,
            on_error,
        )
    }
}

async fn parse_response(
    response: reqwest::Response,
    call: Call,
) -> Result<PollEnvelope, TransportError> {
    let status = response.status();
    let body = response.bytes().await?;

    if status.is_success() {
        return serde_json::from_slice(&body).map_err(|e| {
            TransportError::ServerError(format!("Malformed response from server: {e}"))
        });
    }

    let payload: Option<Value> = serde_json::from_slice(&body).ok();
    let message = payload
        .as_ref()
        .and_then(|payload| payload.get("error"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16()));
    debug!(status = status.as_u16(), ?call, "poll request failed: {}", message);

    Err(match status {
        StatusCode::NOT_FOUND => TransportError::NotFound(message),
        StatusCode::CONFLICT => TransportError::AlreadyVoted {
            message,
            state: payload
                .and_then(|payload| serde_json::from_value::<PollEnvelope>(payload).ok())
                .map(Box::new),
        },
        StatusCode::BAD_REQUEST => match call {
            Call::Vote => TransportError::InvalidOption(message),
            Call::Create => TransportError::Rejected(message),
            Call::Load => TransportError::ServerError(message),
        },
        _ => TransportError::ServerError(message),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> reqwest::Response {
        reqwest::Response::from(
            axum::http::Response::builder()
                .status(status)
                .body(body.to_string())
                .unwrap(),
        )
    }

    const ENVELOPE: &str = r#"{
        "poll": {
            "id": "p1",
            "question": "Pick a color",
            "createdAt": "2025-03-01T12:00:00Z",
            "totalVotes": 1,
            "options": [
                {"id": "r", "text": "Red", "votes": 0},
                {"id": "b", "text": "Blue", "votes": 1}
            ]
        },
        "shareUrl": "http://localhost:3000/poll/p1",
        "viewer": {"hasVoted": true, "votedOptionId": "b"}
    }"#;

    #[test]
    fn test_poll_id_is_one_escaped_path_segment() {
        let client = PollClient::with_http(
            ClientConfig::for_base_url("http://localhost:5000/"),
            reqwest::Client::new(),
        );

        assert_eq!(
            client.poll_url("p1", None).unwrap().as_str(),
            "http://localhost:5000/api/polls/p1"
        );
        assert_eq!(
            client.poll_url("a/b?c#d", Some("vote")).unwrap().as_str(),
            "http://localhost:5000/api/polls/a%2Fb%3Fc%23d/vote"
        );
    }

    #[tokio::test]
    async fn test_success_decodes_envelope() {
        let envelope = parse_response(response(200, ENVELOPE), Call::Load)
            .await
            .unwrap();
        assert_eq!(envelope.poll.total_votes, 1);
        assert_eq!(envelope.viewer.voted_option_id.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_malformed_success_is_server_error() {
        let err = parse_response(response(200, r#"{"poll": 3}"#), Call::Load)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::ServerError(_)));
    }

    #[tokio::test]
    async fn test_error_body_message_is_used() {
        let err = parse_response(response(404, r#"{"error": "Poll not found."}"#), Call::Load)
            .await
            .unwrap_err();
        assert!(matches!(&err, TransportError::NotFound(message) if message == "Poll not found."));
    }

    #[tokio::test]
    async fn test_missing_error_body_falls_back_to_status() {
        let err = parse_response(response(502, "<html>bad gateway</html>"), Call::Vote)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Request failed with status 502");
        assert!(matches!(err, TransportError::ServerError(_)));
    }

    #[tokio::test]
    async fn test_bad_request_depends_on_call() {
        let body = r#"{"error": "nope"}"#;
        assert!(matches!(
            parse_response(response(400, body), Call::Vote).await,
            Err(TransportError::InvalidOption(_))
        ));
        assert!(matches!(
            parse_response(response(400, body), Call::Create).await,
            Err(TransportError::Rejected(_))
        ));
        assert!(matches!(
            parse_response(response(400, body), Call::Load).await,
            Err(TransportError::ServerError(_))
        ));
    }

    #[tokio::test]
    async fn test_conflict_with_and_without_state() {
        let bare = parse_response(
            response(409, r#"{"error": "This browser has already voted in this poll."}"#),
            Call::Vote,
        )
        .await
        .unwrap_err();
        assert!(matches!(bare, TransportError::AlreadyVoted { state: None, .. }));

        let with_state = ENVELOPE.replacen(
            '{',
            r#"{"error": "This browser has already voted in this poll.","#,
            1,
        );
        match parse_response(response(409, &with_state), Call::Vote).await {
            Err(TransportError::AlreadyVoted {
                message,
                state: Some(state),
            }) => {
                assert_eq!(message, "This browser has already voted in this poll.");
                assert_eq!(state.viewer.voted_option_id.as_deref(), Some("b"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
