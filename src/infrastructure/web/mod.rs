//! Active-players relay endpoint
//!
//! Small loopback-only HTTP server that accepts player lists from a local
//! VRChat log watcher and relays them into a Discord channel. Optional
//! shared-token auth via `Authorization: Bearer` or `X-Auth-Token`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::routing::any;
use axum::Router;
use serde::Deserialize;
use serenity::all::{ChannelId, Http};
use tracing::{error, info, warn};

const MAX_MESSAGE_LENGTH: usize = 1900;

#[derive(Clone)]
struct AppState {
    http: Arc<Http>,
    channel_id: u64,
    token: Option<String>,
}

#[derive(Deserialize)]
struct ActivePlayersPayload {
    #[serde(default)]
    players: Vec<String>,
    #[allow(dead_code)]
    count: Option<u32>,
    #[allow(dead_code)]
    source: Option<String>,
}

pub struct ActivePlayersServer {
    port: u16,
    token: Option<String>,
    channel_id: u64,
}

impl ActivePlayersServer {
    pub fn new(port: u16, token: Option<String>, channel_id: u64) -> Self {
        Self {
            port,
            token,
            channel_id,
        }
    }

    /// Binds to loopback and serves in a background task.
    pub fn start(&self, http: Arc<Http>) {
        let state = AppState {
            http,
            channel_id: self.channel_id,
            token: self.token.clone(),
        };
        let app = Router::new()
            .route("/active-players", any(handle_active_players))
            .with_state(state);
        let address = format!("127.0.0.1:{}", self.port);
        tokio::spawn(async move {
            let listener = match tokio::net::TcpListener::bind(&address).await {
                Ok(listener) => listener,
                Err(e) => {
                    error!("Failed to bind active-players server on {}: {}", address, e);
                    return;
                }
            };
            info!("Active-players server listening on {}", address);
            if let Err(e) = axum::serve(listener, app).await {
                error!("Active-players server stopped: {}", e);
            }
        });
    }
}

async fn handle_active_players(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, &'static str) {
    if method != Method::POST {
        return (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed");
    }
    if !is_authorized(state.token.as_deref(), &headers) {
        return (StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    let payload: ActivePlayersPayload = match serde_json::from_str(&body) {
        Ok(payload) => payload,
        Err(_) => return (StatusCode::BAD_REQUEST, "Invalid JSON payload"),
    };
    let channel = ChannelId::new(state.channel_id);
    if channel.to_channel(&state.http).await.is_err() {
        return (StatusCode::NOT_FOUND, "Channel not found");
    }
    for message in build_messages(&payload.players) {
        if let Err(e) = channel.say(&state.http, message).await {
            warn!("Failed to relay active players: {}", e);
        }
    }
    (StatusCode::OK, "OK")
}

/// No configured token means the endpoint is open; loopback binding is the
/// only protection in that case.
fn is_authorized(expected: Option<&str>, headers: &HeaderMap) -> bool {
    let Some(expected) = expected.filter(|t| !t.trim().is_empty()) else {
        return true;
    };
    if let Some(auth) = headers.get("Authorization").and_then(|v| v.to_str().ok()) {
        if auth.to_lowercase().starts_with("bearer ") {
            return auth["bearer ".len()..].trim() == expected;
        }
    }
    headers
        .get("X-Auth-Token")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|token| token == expected)
}

/// Splits the player list into Discord-sized messages. Continuation chunks
/// get their own header.
fn build_messages(players: &[String]) -> Vec<String> {
    if players.is_empty() {
        return vec!["Active players: none detected.".to_string()];
    }
    let header = format!("Active players ({}): ", players.len());
    let mut messages = Vec::new();
    let mut current = header.clone();
    for player in players {
        let entry = player.trim();
        if entry.is_empty() {
            continue;
        }
        let prefix = if current.len() == header.len() { "" } else { ", " };
        if current.len() + prefix.len() + entry.len() > MAX_MESSAGE_LENGTH {
            messages.push(current);
            current = format!("Active players (cont.): {}", entry);
            continue;
        }
        current.push_str(prefix);
        current.push_str(entry);
    }
    if !current.is_empty() {
        messages.push(current);
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                axum::http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn open_endpoint_when_no_token_configured() {
        assert!(is_authorized(None, &headers(&[])));
        assert!(is_authorized(Some("  "), &headers(&[])));
    }

    #[test]
    fn bearer_auth_is_case_insensitive_on_scheme() {
        let map = headers(&[("Authorization", "BEARER secret")]);
        assert!(is_authorized(Some("secret"), &map));
        let map = headers(&[("Authorization", "Bearer wrong")]);
        assert!(!is_authorized(Some("secret"), &map));
    }

    #[test]
    fn token_header_must_match_exactly() {
        let map = headers(&[("X-Auth-Token", "secret")]);
        assert!(is_authorized(Some("secret"), &map));
        let map = headers(&[("X-Auth-Token", "other")]);
        assert!(!is_authorized(Some("secret"), &map));
        assert!(!is_authorized(Some("secret"), &headers(&[])));
    }

    #[test]
    fn empty_player_list_gets_placeholder_message() {
        assert_eq!(
            build_messages(&[]),
            vec!["Active players: none detected.".to_string()]
        );
    }

    #[test]
    fn players_are_joined_with_count_header() {
        let players = vec!["alice".to_string(), " bob ".to_string(), "".to_string()];
        assert_eq!(build_messages(&players), vec!["Active players (3): alice, bob"]);
    }

    #[test]
    fn long_lists_are_chunked_with_continuation_headers() {
        let players: Vec<String> = (0..100).map(|i| format!("player-{:04}-{}", i, "x".repeat(30))).collect();
        let messages = build_messages(&players);
        assert!(messages.len() > 1);
        assert!(messages[0].starts_with("Active players (100): "));
        for message in &messages[1..] {
            assert!(message.starts_with("Active players (cont.): "));
        }
        for message in &messages {
            assert!(message.len() <= MAX_MESSAGE_LENGTH + "Active players (cont.): ".len());
        }
    }
}
