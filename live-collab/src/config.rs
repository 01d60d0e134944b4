//! Live session configuration.

/// Connection and session settings.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    /// WebSocket endpoint of the live socket
    pub socket_url: String,
    /// Query parameter carrying the bearer token
    pub token_param: String,
    /// Prefix of the channel topic; the room id follows it
    pub topic_prefix: String,
    /// Inbound frame buffer between the socket reader and the transport
    pub channel_capacity: usize,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            socket_url: "ws://127.0.0.1:4000/socket".to_string(),
            token_param: "guardian_token".to_string(),
            topic_prefix: "live:".to_string(),
            channel_capacity: 256,
        }
    }
}

impl LiveConfig {
    /// Socket URL with the token attached.
    pub fn connect_url(&self, token: &str) -> String {
        let separator = if self.socket_url.contains('?') { '&' } else { '?' };
        format!("{}{separator}{}={token}", self.socket_url, self.token_param)
    }

    /// Channel topic for a room.
    pub fn topic(&self, room_id: &str) -> String {
        format!("{}{room_id}", self.topic_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LiveConfig::default();
        assert_eq!(config.token_param, "guardian_token");
        assert_eq!(config.channel_capacity, 256);
    }

    #[test]
    fn test_connect_url() {
        let config = LiveConfig::default();
        assert_eq!(
            config.connect_url("tok"),
            "ws://127.0.0.1:4000/socket?guardian_token=tok"
        );

        let config = LiveConfig {
            socket_url: "wss://example.test/socket?vsn=2.0.0".to_string(),
            ..LiveConfig::default()
        };
        assert_eq!(
            config.connect_url("tok"),
            "wss://example.test/socket?vsn=2.0.0&guardian_token=tok"
        );
    }

    #[test]
    fn test_topic() {
        let config = LiveConfig::default();
        assert_eq!(config.topic("room42"), "live:room42");
    }
}
