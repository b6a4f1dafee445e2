//! Browser token and network fingerprint used to keep one vote per viewer.

use std::net::SocketAddr;

use axum::http::HeaderMap;
use sha2::{Digest, Sha256, Sha512};
use tower_cookies::{
    Cookie, Cookies, Key,
    cookie::{SameSite, time::Duration},
};
use tracing::debug;
use uuid::Uuid;

use crate::config::ServerConfig;

const COOKIE_MAX_AGE_DAYS: i64 = 365;

/// Hashed identity of the viewer behind a request. Raw values never leave
/// this module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoterIdentity {
    pub token_hash: String,
    pub ip_hash: String,
}

/// Signing key for the voter cookie, stretched from `SECRET_KEY`.
pub fn cookie_key(secret: &str) -> Key {
    Key::from(Sha512::digest(secret.as_bytes()).as_slice())
}

/// Resolves the voter token from the signed cookie, issuing a fresh one when
/// it is missing or tampered with.
pub fn identify(
    cookies: &Cookies,
    key: &Key,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    config: &ServerConfig,
) -> VoterIdentity {
    let signed = cookies.signed(key);

    let token = match signed.get(&config.cookie_name) {
        Some(cookie) if !cookie.value().trim().is_empty() => cookie.value().to_string(),
        _ => {
            let token = Uuid::new_v4().simple().to_string();
            debug!("issuing new voter token cookie");
            signed.add(
                Cookie::build((config.cookie_name.clone(), token.clone()))
                    .path("/")
                    .http_only(true)
                    .secure(config.cookie_secure)
                    .same_site(SameSite::Lax)
                    .max_age(Duration::days(COOKIE_MAX_AGE_DAYS))
                    .build(),
            );
            token
        }
    };

    VoterIdentity {
        token_hash: hash_voter_token(&token),
        ip_hash: hash_ip(&config.ip_hash_salt, &client_ip(headers, peer)),
    }
}

pub fn hash_voter_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

pub fn hash_ip(salt: &str, ip: &str) -> String {
    format!("{:x}", Sha256::digest(format!("{salt}:{ip}").as_bytes()))
}

/// First `X-Forwarded-For` hop, else the peer address.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    match (forwarded, peer) {
        (Some(ip), _) => ip.to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => "0.0.0.0".to_string(),
    }
}
