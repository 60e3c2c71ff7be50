//! Transport configuration types.

use serde::{Deserialize, Serialize};

/// Size ceilings for outgoing message bodies and inbound replies.
///
/// `None` disables the corresponding check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Largest reply body accepted from a POST, in bytes.
    pub max_response_size: Option<usize>,

    /// Largest encoded message the client will POST, in bytes.
    pub max_request_size: Option<usize>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_response_size: Some(10 * 1024 * 1024), // 10MB
            max_request_size: Some(1024 * 1024),       // 1MB
        }
    }
}

impl LimitsConfig {
    /// No limits. Useful behind a gateway that already enforces them.
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_response_size: None,
            max_request_size: None,
        }
    }

    /// Tight limits for untrusted servers.
    #[must_use]
    pub const fn strict() -> Self {
        Self {
            max_response_size: Some(1024 * 1024), // 1MB
            max_request_size: Some(256 * 1024),   // 256KB
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_config_default() {
        let config = LimitsConfig::default();
        assert_eq!(config.max_response_size, Some(10 * 1024 * 1024));
        assert_eq!(config.max_request_size, Some(1024 * 1024));
    }

    #[test]
    fn test_limits_config_presets() {
        assert_eq!(LimitsConfig::unlimited().max_request_size, None);
        assert_eq!(LimitsConfig::strict().max_request_size, Some(256 * 1024));
    }
}
