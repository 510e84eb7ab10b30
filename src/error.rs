use std::fmt;

/// Error taxonomy for the GEX core. Each variant demands a different
/// operator action, so they must stay distinguishable:
/// - `Configuration`: credentials absent/placeholder — supply them out of band.
/// - `Renewal`: token endpoint rejected the refresh — re-authenticate.
/// - `Transport`: network-level failure — retry/backoff is the caller's call.
/// - `DataShape`: structurally unusable payload from an upstream API.
#[derive(Debug)]
pub enum GexError {
    Configuration(String),
    Renewal { status: u16, detail: String },
    Transport(String),
    DataShape(String),
}

impl fmt::Display for GexError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GexError::Configuration(msg) => write!(f, "Not configured: {}", msg),
            GexError::Renewal { status, detail } => write!(
                f,
                "Token renewal failed ({}): {}. The refresh token may have \
                 expired (7-day limit). Re-authenticate and update \
                 SCHWAB_REFRESH_TOKEN.",
                status, detail
            ),
            GexError::Transport(msg) => write!(f, "Transport error: {}", msg),
            GexError::DataShape(msg) => write!(f, "Malformed data: {}", msg),
        }
    }
}

impl std::error::Error for GexError {}

impl From<reqwest::Error> for GexError {
    fn from(err: reqwest::Error) -> Self {
        GexError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for GexError {
    fn from(err: serde_json::Error) -> Self {
        GexError::DataShape(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renewal_message_is_actionable() {
        let err = GexError::Renewal {
            status: 400,
            detail: "invalid_grant".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("400"));
        assert!(msg.contains("Re-authenticate"));
    }

    #[test]
    fn test_configuration_distinguishable_from_renewal() {
        let cfg = GexError::Configuration("missing key".to_string());
        assert!(cfg.to_string().starts_with("Not configured"));
        assert!(matches!(cfg, GexError::Configuration(_)));
    }
}
