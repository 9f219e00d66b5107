use serde::Deserialize;
use thiserror::Error;

use pizarra_shared::stomp::HeartBeat;
use pizarra_shared::{DEFAULT_HEIGHT, DEFAULT_WIDTH, PUBLISH_DESTINATION, SUBSCRIPTION_TOPIC};

use crate::sampler::ExitPolicy;
use crate::transport::TransportConfig;

pub const DEFAULT_RECONNECT_DELAY_MS: u32 = 5000;
pub const DEFAULT_HEARTBEAT_MS: u32 = 10000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("endpoint {0:?} is not a ws, wss, http or https URL")]
    Endpoint(String),
    #[error("reconnect delay must be positive")]
    ReconnectDelay,
    #[error("destination {0:?} must start with '/'")]
    Destination(String),
}

/// Everything a mounted whiteboard needs to know, injected by the embedder.
/// Every field has a default, so `{}` is a valid configuration.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    /// Broker URL. Defaults to `/ws` on the page's own host.
    pub endpoint: Option<String>,
    pub width: u32,
    pub height: u32,
    pub reconnect_delay_ms: u32,
    pub heartbeat_outgoing_ms: u32,
    pub heartbeat_incoming_ms: u32,
    pub topic: String,
    pub destination: String,
    pub optimistic_paint: bool,
    pub exit_policy: ExitPolicy,
    /// Target the raw WebSocket transport of a SockJS endpoint.
    pub sockjs: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            heartbeat_outgoing_ms: DEFAULT_HEARTBEAT_MS,
            heartbeat_incoming_ms: DEFAULT_HEARTBEAT_MS,
            topic: SUBSCRIPTION_TOPIC.to_string(),
            destination: PUBLISH_DESTINATION.to_string(),
            optimistic_paint: false,
            exit_policy: ExitPolicy::Chord,
            sockjs: false,
        }
    }
}

impl SessionConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: SessionConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reconnect_delay_ms == 0 {
            return Err(ConfigError::ReconnectDelay);
        }
        for destination in [&self.topic, &self.destination] {
            if !destination.starts_with('/') {
                return Err(ConfigError::Destination(destination.clone()));
            }
        }
        if let Some(endpoint) = &self.endpoint {
            normalize_endpoint(endpoint, self.sockjs)?;
        }
        Ok(())
    }

    pub fn heartbeat(&self) -> HeartBeat {
        HeartBeat {
            outgoing: self.heartbeat_outgoing_ms,
            incoming: self.heartbeat_incoming_ms,
        }
    }

    /// Resolves the socket URL: an explicit endpoint wins, otherwise `/ws` on
    /// the host that served the page.
    pub fn endpoint_url(&self, page_protocol: &str, page_host: &str) -> Result<String, ConfigError> {
        match &self.endpoint {
            Some(endpoint) => normalize_endpoint(endpoint, self.sockjs),
            None => {
                let scheme = if page_protocol == "https:" { "wss" } else { "ws" };
                normalize_endpoint(&format!("{scheme}://{page_host}/ws"), self.sockjs)
            }
        }
    }

    pub fn transport(&self, url: String) -> TransportConfig {
        TransportConfig {
            host: host_of(&url).to_string(),
            url,
            reconnect_delay_ms: self.reconnect_delay_ms,
            heartbeat: self.heartbeat(),
        }
    }
}

/// Maps http(s) URLs onto their WebSocket schemes and optionally appends the
/// SockJS raw WebSocket path.
pub fn normalize_endpoint(endpoint: &str, sockjs: bool) -> Result<String, ConfigError> {
    let endpoint = endpoint.trim();
    let (scheme, rest) = endpoint
        .split_once("://")
        .ok_or_else(|| ConfigError::Endpoint(endpoint.to_string()))?;
    let scheme = match scheme.to_ascii_lowercase().as_str() {
        "ws" | "http" => "ws",
        "wss" | "https" => "wss",
        _ => return Err(ConfigError::Endpoint(endpoint.to_string())),
    };
    let rest = rest.trim_end_matches('/');
    if rest.is_empty() {
        return Err(ConfigError::Endpoint(endpoint.to_string()));
    }
    let mut url = format!("{scheme}://{rest}");
    if sockjs && !url.ends_with("/websocket") {
        url.push_str("/websocket");
    }
    Ok(url)
}

pub fn host_of(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    &rest[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_yields_defaults() {
        let config = SessionConfig::from_json("{}").expect("config");
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.width, 800);
        assert_eq!(config.height, 500);
        assert_eq!(config.reconnect_delay_ms, 5000);
        assert_eq!(config.topic, "/topic/pizarra");
        assert_eq!(config.destination, "/app/draw");
    }

    #[test]
    fn json_overrides_fields() {
        let config = SessionConfig::from_json(
            r#"{"endpoint":"https://board.example/ws","width":640,"exitPolicy":"pause","optimisticPaint":true}"#,
        )
        .expect("config");
        assert_eq!(config.width, 640);
        assert_eq!(config.height, 500);
        assert_eq!(config.exit_policy, ExitPolicy::Pause);
        assert!(config.optimistic_paint);
        assert_eq!(
            config.endpoint_url("http:", "ignored").expect("url"),
            "wss://board.example/ws"
        );
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            SessionConfig::from_json(r#"{"reconnectDelayMs":0}"#),
            Err(ConfigError::ReconnectDelay)
        ));
        assert!(matches!(
            SessionConfig::from_json(r#"{"topic":"pizarra"}"#),
            Err(ConfigError::Destination(_))
        ));
        assert!(matches!(
            SessionConfig::from_json(r#"{"endpoint":"ftp://x"}"#),
            Err(ConfigError::Endpoint(_))
        ));
        assert!(matches!(
            SessionConfig::from_json(r#"{"width":"wide"}"#),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn endpoint_falls_back_to_page_host() {
        let config = SessionConfig::default();
        assert_eq!(
            config.endpoint_url("https:", "board.example:8443").expect("url"),
            "wss://board.example:8443/ws"
        );
        assert_eq!(
            config.endpoint_url("http:", "localhost:3000").expect("url"),
            "ws://localhost:3000/ws"
        );
    }

    #[test]
    fn sockjs_endpoints_get_the_websocket_suffix() {
        assert_eq!(
            normalize_endpoint("https://host.example/ws/", true).expect("url"),
            "wss://host.example/ws/websocket"
        );
        assert_eq!(
            normalize_endpoint("wss://host.example/ws/websocket", true).expect("url"),
            "wss://host.example/ws/websocket"
        );
    }

    #[test]
    fn transport_config_carries_host_and_timers() {
        let config = SessionConfig::default();
        let transport = config.transport("wss://board.example:8443/ws?x=1".into());
        assert_eq!(transport.host, "board.example:8443");
        assert_eq!(transport.reconnect_delay_ms, 5000);
        assert_eq!(transport.heartbeat.to_string(), "10000,10000");
    }
}
