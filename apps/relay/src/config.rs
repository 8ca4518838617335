/// Relay configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Redis connection string for the cross-node pub/sub store.
    pub redis_url: String,
    /// Port the HTTP/WebSocket server binds to.
    pub port: u16,
    /// Path the WebSocket gateway is mounted at.
    pub gateway_path: String,
    /// Instance identifier reported to clients in the initial frame.
    pub instance_name: String,
    /// Maximum buffered entries per message-list resource.
    pub message_history_limit: usize,
    /// Seconds between server heartbeat pings on each connection.
    pub heartbeat_interval_secs: u64,
    /// Seconds between audit counter flushes.
    pub audit_flush_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379/0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4010),
            gateway_path: std::env::var("GATEWAY_PATH")
                .unwrap_or_else(|_| "/gateway".to_string()),
            instance_name: std::env::var("INSTANCE_NAME")
                .or_else(|_| std::env::var("HOSTNAME"))
                .unwrap_or_else(|_| "relay".to_string()),
            message_history_limit: std::env::var("MESSAGE_HISTORY_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(100),
            heartbeat_interval_secs: std::env::var("HEARTBEAT_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(15),
            audit_flush_secs: std::env::var("AUDIT_FLUSH_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379/0".to_string(),
            port: 4010,
            gateway_path: "/gateway".to_string(),
            instance_name: "relay".to_string(),
            message_history_limit: 100,
            heartbeat_interval_secs: 15,
            audit_flush_secs: 60,
        }
    }
}
