//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use crate::error::ConfigError;

/// Session-name prefix reserved for sessions this tool owns
pub const DEFAULT_SESSION_PREFIX: &str = "vllmctl_";

/// Placeholder identity for a service that answers without naming its model
pub const UNKNOWN_MODEL: &str = "unknown";

/// Deterministic name of the tunnel session for `(host, remote_port)`.
///
/// Both the session table and the process table are correlated through this
/// name, so it must stay a pure function of its inputs.
///
/// The host is embedded verbatim. tmux rewrites `.` and `:` in session names
/// to `_`, so a dotted alias such as `gpu.example.com` never matches a live
/// session by name; forwards to such hosts are still found through the
/// process table and torn down by pid.
pub fn session_name(prefix: &str, host: &str, remote_port: u16) -> String {
    format!("{}{}_{}", prefix, host, remote_port)
}

/// Name of the remote session that hosts a launched inference server
pub fn service_session_name(prefix: &str, remote_port: u16) -> String {
    format!("{}serve_{}", prefix, remote_port)
}

/// Recover `(host, remote_port)` from a tunnel session name.
///
/// The host is everything between the prefix and the last underscore, so
/// hosts that themselves contain underscores survive the round trip.
pub fn parse_session_name(prefix: &str, name: &str) -> Option<(String, u16)> {
    let rest = name.strip_prefix(prefix)?;
    let (host, port) = rest.rsplit_once('_')?;
    if host.is_empty() {
        return None;
    }
    let port = port.parse::<u16>().ok().filter(|p| *p != 0)?;
    Some((host.to_string(), port))
}

/// One remote service instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Endpoint {
    /// Host alias as written in the SSH config
    pub host: String,
    /// Port the service listens on, on the remote host's loopback
    pub remote_port: u16,
}

impl Endpoint {
    /// Create a new endpoint
    pub fn new(host: impl Into<String>, remote_port: u16) -> Self {
        Self {
            host: host.into(),
            remote_port,
        }
    }

    /// Tunnel session name for this endpoint
    pub fn session_name(&self, prefix: &str) -> String {
        session_name(prefix, &self.host, self.remote_port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.remote_port)
    }
}

/// Model identifier advertised by an inference server
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelIdentity(String);

impl ModelIdentity {
    /// Create a model identity from a raw id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identity of a service that answered without an id
    pub fn unknown() -> Self {
        Self(UNKNOWN_MODEL.to_string())
    }

    /// Parse a self-description body.
    ///
    /// Returns `None` unless the body, once trimmed, opens with `{` and is a
    /// JSON object. Any object counts as a running service: the id is taken
    /// from `data[0].id` when that is a non-empty string, and is
    /// [`ModelIdentity::unknown`] otherwise.
    pub fn from_listing(body: &str) -> Option<Self> {
        let body = body.trim();
        if !body.starts_with('{') {
            return None;
        }
        let listing: serde_json::Value = serde_json::from_str(body).ok()?;
        if !listing.is_object() {
            return None;
        }
        let id = listing
            .pointer("/data/0/id")
            .and_then(serde_json::Value::as_str)
            .filter(|id| !id.is_empty());
        Some(id.map(Self::new).unwrap_or_else(Self::unknown))
    }

    /// Get the raw id string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ModelIdentity {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A tunnel process as seen in the process table.
///
/// The destination host is optional: a tunnel whose host token cannot be
/// inferred is still recorded, since its ports are useful for allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedTunnel {
    /// Process id of the tunnel client
    pub pid: u32,
    /// Locally bound port
    pub local_port: u16,
    /// Port on the remote side
    pub remote_port: u16,
    /// Destination host token, if one could be identified
    pub host: Option<String>,
}

impl ObservedTunnel {
    /// Whether this tunnel serves the given endpoint
    pub fn serves(&self, endpoint: &Endpoint) -> bool {
        self.remote_port == endpoint.remote_port && self.host.as_deref() == Some(&endpoint.host)
    }
}

/// A realized local-to-remote tunnel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Forward {
    /// Remote service this forward reaches
    pub endpoint: Endpoint,
    /// Local port the tunnel listens on
    pub local_port: u16,
    /// Deterministic session name, see [`session_name`]
    pub session_name: String,
    /// Owning tunnel process, when discovered through the process table
    pub pid: Option<u32>,
}

/// Inclusive range of local ports available for allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LocalRange {
    start: u16,
    end: u16,
}

impl LocalRange {
    /// Create a range, rejecting empty ranges and port 0
    pub fn new(start: u16, end: u16) -> Result<Self, ConfigError> {
        if start == 0 || start > end {
            return Err(ConfigError::LocalRange(format!("{}-{}", start, end)));
        }
        Ok(Self { start, end })
    }

    /// All ports of the range, lowest first
    pub fn ports(&self) -> RangeInclusive<u16> {
        self.start..=self.end
    }
}

impl Default for LocalRange {
    fn default() -> Self {
        Self {
            start: 16100,
            end: 16199,
        }
    }
}

impl FromStr for LocalRange {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::LocalRange(s.to_string());
        let (start, end) = s.trim().split_once('-').ok_or_else(invalid)?;
        let start = start.trim().parse::<u16>().map_err(|_| invalid())?;
        let end = end.trim().parse::<u16>().map_err(|_| invalid())?;
        Self::new(start, end).map_err(|_| invalid())
    }
}

impl TryFrom<String> for LocalRange {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<LocalRange> for String {
    fn from(range: LocalRange) -> Self {
        range.to_string()
    }
}

impl fmt::Display for LocalRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_name_is_deterministic() {
        let a = Endpoint::new("gpu-1", 8000);
        let b = Endpoint::new("gpu-1", 8000);
        assert_eq!(a.session_name("vllmctl_"), "vllmctl_gpu-1_8000");
        assert_eq!(a.session_name("vllmctl_"), b.session_name("vllmctl_"));
    }

    #[test]
    fn test_parse_session_name() {
        assert_eq!(
            parse_session_name("vllmctl_", "vllmctl_gpu_box_8000"),
            Some(("gpu_box".to_string(), 8000))
        );
        assert_eq!(parse_session_name("vllmctl_", "other_gpu_8000"), None);
        assert_eq!(parse_session_name("vllmctl_", "vllmctl_gpu"), None);
        assert_eq!(parse_session_name("vllmctl_", "vllmctl__8000"), None);
    }

    #[test]
    fn test_model_identity_from_listing() {
        let body = r#"  {"object":"list","data":[{"id":"Qwen2.5"}]}  "#;
        assert_eq!(
            ModelIdentity::from_listing(body),
            Some(ModelIdentity::new("Qwen2.5"))
        );
    }

    #[test]
    fn test_model_identity_without_id_is_unknown() {
        assert_eq!(
            ModelIdentity::from_listing(r#"{"models": []}"#),
            Some(ModelIdentity::unknown())
        );
        assert_eq!(
            ModelIdentity::from_listing(r#"{"data": []}"#),
            Some(ModelIdentity::unknown())
        );
    }

    #[test]
    fn test_model_identity_tolerates_odd_shapes() {
        for body in [
            r#"{"object":"list","data":null}"#,
            r#"{"data":{}}"#,
            r#"{"data":[{"id":7}]}"#,
            r#"{"data":["x"]}"#,
            r#"{"data":[{"id":""}]}"#,
        ] {
            assert_eq!(
                ModelIdentity::from_listing(body),
                Some(ModelIdentity::unknown()),
                "{}",
                body
            );
        }
    }

    #[test]
    fn test_dotted_host_keeps_its_dots() {
        assert_eq!(
            session_name("vllmctl_", "gpu.example.com", 8000),
            "vllmctl_gpu.example.com_8000"
        );
        assert_eq!(
            parse_session_name("vllmctl_", "vllmctl_gpu.example.com_8000"),
            Some(("gpu.example.com".to_string(), 8000))
        );
    }

    #[test]
    fn test_model_identity_rejects_non_objects() {
        assert_eq!(ModelIdentity::from_listing(""), None);
        assert_eq!(ModelIdentity::from_listing("curl: (7) Failed to connect"), None);
        assert_eq!(ModelIdentity::from_listing("{not json"), None);
        assert_eq!(ModelIdentity::from_listing("[1, 2]"), None);
    }

    #[test]
    fn test_local_range_parse() {
        let range: LocalRange = "16100-16199".parse().unwrap();
        assert_eq!(range.ports().next(), Some(16100));
        assert_eq!(range.ports().last(), Some(16199));
        assert_eq!(range.to_string(), "16100-16199");

        assert!("16199-16100".parse::<LocalRange>().is_err());
        assert!("0-10".parse::<LocalRange>().is_err());
        assert!("16100".parse::<LocalRange>().is_err());
        assert!("a-b".parse::<LocalRange>().is_err());
    }

    #[test]
    fn test_observed_tunnel_without_host_serves_nothing() {
        let tunnel = ObservedTunnel {
            pid: 42,
            local_port: 16100,
            remote_port: 8000,
            host: None,
        };
        assert!(!tunnel.serves(&Endpoint::new("gpu-1", 8000)));
    }
}
