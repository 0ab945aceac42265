//! Gateway configuration.
//!
//! Everything comes from environment variables (optionally loaded from a
//! `.env` file by the binary). Unset variables fall back to defaults; set but
//! unparsable ones are an error.

use crate::error::{GatewayError, Result};
use crate::validation::MAX_TEXT_CHARS;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Read deadline. Refreshed by each pong.
pub const DEFAULT_PONG_WAIT: Duration = Duration::from_secs(60);

/// Deadline for a single outbound write.
pub const DEFAULT_WRITE_WAIT: Duration = Duration::from_secs(10);

/// Smallest frame limit that still fits every valid chat message.
///
/// Each character may arrive as a `\uXXXX\uXXXX` surrogate escape (12 bytes),
/// plus room for the ids and JSON keys. Frames above the limit are dropped by
/// the transport without an acknowledgment, so overlong text must fit under it
/// to be rejected by validation instead.
pub const MIN_MAX_MESSAGE_SIZE: usize = MAX_TEXT_CHARS * 12 + 4 * 1024;

/// Largest inbound frame accepted, in bytes.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 128 * 1024;

/// Origin used by local tooling. Always allowed.
pub const TEST_CLIENT_ORIGIN: &str = "test_client";

const DEFAULT_HTTP_PORT: u16 = 8080;
const DEFAULT_METRICS_PORT: u16 = 9093;
const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";

/// Per-connection timing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimings {
    pub pong_wait: Duration,
    /// Always 9/10 of `pong_wait`.
    pub ping_period: Duration,
    pub write_wait: Duration,
    pub max_message_size: usize,
}

impl SessionTimings {
    pub fn new(pong_wait: Duration, write_wait: Duration) -> Self {
        Self {
            pong_wait,
            ping_period: pong_wait * 9 / 10,
            write_wait,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self::new(DEFAULT_PONG_WAIT, DEFAULT_WRITE_WAIT)
    }
}

/// Which `Origin` headers may open a WebSocket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginPolicy {
    allowed: Vec<String>,
}

impl OriginPolicy {
    /// Allow the given origins plus [`TEST_CLIENT_ORIGIN`].
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut allowed: Vec<String> = Vec::new();
        let normalized = origins
            .into_iter()
            .map(Into::into)
            .map(|o| o.trim().trim_end_matches('/').to_string())
            .chain(std::iter::once(TEST_CLIENT_ORIGIN.to_string()));
        for origin in normalized {
            if !origin.is_empty() && !allowed.contains(&origin) {
                allowed.push(origin);
            }
        }
        Self { allowed }
    }

    /// A missing origin is never allowed.
    pub fn allows(&self, origin: Option<&str>) -> bool {
        match origin {
            Some(origin) => {
                let origin = origin.trim_end_matches('/');
                self.allowed.iter().any(|allowed| allowed == origin)
            }
            None => false,
        }
    }

    pub fn allowed(&self) -> &[String] {
        &self.allowed
    }
}

impl Default for OriginPolicy {
    fn default() -> Self {
        Self::new(Vec::<String>::new())
    }
}

/// Full gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub http_port: u16,
    pub metrics_port: u16,
    pub redis_url: String,
    pub origins: OriginPolicy,
    pub timings: SessionTimings,
}

impl GatewayConfig {
    /// Load from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load using `lookup` to resolve variable names.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let http_port = parse_var(&lookup, "HTTP_PORT")?.unwrap_or(DEFAULT_HTTP_PORT);
        let metrics_port = parse_var(&lookup, "METRICS_PORT")?.unwrap_or(DEFAULT_METRICS_PORT);
        let redis_url = lookup("REDIS_URL").unwrap_or_else(|| DEFAULT_REDIS_URL.to_string());

        let mut origins = Vec::new();
        match lookup("FRONTEND_URL") {
            Some(url) => origins.push(url),
            None => warn!("FRONTEND_URL not set, only {} origin allowed", TEST_CLIENT_ORIGIN),
        }
        if let Some(extra) = lookup("ALLOWED_ORIGINS") {
            origins.extend(extra.split(',').map(str::to_string));
        }

        let pong_wait = parse_secs(&lookup, "PONG_WAIT_SECS")?.unwrap_or(DEFAULT_PONG_WAIT);
        let write_wait = parse_secs(&lookup, "WRITE_WAIT_SECS")?.unwrap_or(DEFAULT_WRITE_WAIT);
        let mut timings = SessionTimings::new(pong_wait, write_wait);
        if let Some(max) = parse_var(&lookup, "MAX_MESSAGE_BYTES")? {
            if max < MIN_MAX_MESSAGE_SIZE {
                return Err(GatewayError::Config(format!(
                    "MAX_MESSAGE_BYTES must be at least {}",
                    MIN_MAX_MESSAGE_SIZE
                )));
            }
            timings.max_message_size = max;
        }

        Ok(Self {
            http_port,
            metrics_port,
            redis_url,
            origins: OriginPolicy::new(origins),
            timings,
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| GatewayError::Config(format!("{} must be a number, got '{}'", key, value))),
        None => Ok(None),
    }
}

fn parse_secs<F>(lookup: &F, key: &str) -> Result<Option<Duration>>
where
    F: Fn(&str) -> Option<String>,
{
    match parse_var::<F, u64>(lookup, key)? {
        Some(0) => Err(GatewayError::Config(format!(
            "{} must be greater than zero",
            key
        ))),
        Some(secs) => Ok(Some(Duration::from_secs(secs))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<GatewayConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        GatewayConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.metrics_port, 9093);
        assert_eq!(config.redis_url, "redis://localhost:6379");
        assert_eq!(config.timings, SessionTimings::default());
        assert_eq!(config.timings.ping_period, Duration::from_secs(54));
        assert_eq!(config.origins.allowed(), ["test_client"]);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("HTTP_PORT", "9000"),
            ("FRONTEND_URL", "https://market.example/"),
            ("ALLOWED_ORIGINS", "https://a.example, https://b.example"),
            ("PONG_WAIT_SECS", "20"),
            ("MAX_MESSAGE_BYTES", "262144"),
        ])
        .unwrap();

        assert_eq!(config.http_port, 9000);
        assert_eq!(config.timings.pong_wait, Duration::from_secs(20));
        assert_eq!(config.timings.ping_period, Duration::from_secs(18));
        assert_eq!(config.timings.max_message_size, 262_144);
        assert!(config.origins.allows(Some("https://market.example")));
        assert!(config.origins.allows(Some("https://b.example")));
    }

    #[test]
    fn test_invalid_values_are_errors() {
        assert!(matches!(
            load(&[("HTTP_PORT", "eighty")]),
            Err(GatewayError::Config(_))
        ));
        assert!(matches!(
            load(&[("PONG_WAIT_SECS", "0")]),
            Err(GatewayError::Config(_))
        ));
        assert!(matches!(
            load(&[("MAX_MESSAGE_BYTES", "32768")]),
            Err(GatewayError::Config(_))
        ));
    }

    #[test]
    fn test_default_frame_limit_fits_escaped_text() {
        assert!(DEFAULT_MAX_MESSAGE_SIZE >= MIN_MAX_MESSAGE_SIZE);

        let text = "\\ud83d\\ude00".repeat(MAX_TEXT_CHARS);
        let frame = format!(
            r#"{{"text":"{}","receiver_id":"{}","sender_id":"{}","room_id":"{}"}}"#,
            text,
            "r".repeat(256),
            "s".repeat(256),
            "m".repeat(256)
        );
        assert!(frame.len() <= MIN_MAX_MESSAGE_SIZE);
    }

    #[test]
    fn test_origin_policy() {
        let policy = OriginPolicy::new(["https://market.example"]);
        assert!(policy.allows(Some("https://market.example")));
        assert!(policy.allows(Some("test_client")));
        assert!(!policy.allows(Some("https://evil.example")));
        assert!(!policy.allows(None));
    }

    #[test]
    fn test_origin_policy_skips_duplicates() {
        let policy = OriginPolicy::new([
            "https://a.example",
            "https://b.example",
            "https://a.example/",
            "test_client",
        ]);
        assert_eq!(
            policy.allowed(),
            ["https://a.example", "https://b.example", "test_client"]
        );
    }
}
