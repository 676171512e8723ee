//! Domain error types.

/// Top-level error type for tradesim.
#[derive(Debug, thiserror::Error)]
pub enum TradesimError {
    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error("insufficient data: have {bars} bars, need {required}")]
    InsufficientData { bars: usize, required: usize },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TradesimError {
    pub fn configuration(reason: impl Into<String>) -> Self {
        TradesimError::Configuration {
            reason: reason.into(),
        }
    }

    pub fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        TradesimError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&TradesimError> for std::process::ExitCode {
    fn from(err: &TradesimError) -> Self {
        let code: u8 = match err {
            TradesimError::Io(_) => 1,
            TradesimError::ConfigParse { .. }
            | TradesimError::ConfigMissing { .. }
            | TradesimError::ConfigInvalid { .. } => 2,
            TradesimError::Data { .. } => 3,
            TradesimError::Configuration { .. } => 4,
            TradesimError::InsufficientData { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_data_reports_counts() {
        let err = TradesimError::InsufficientData {
            bars: 12,
            required: 50,
        };
        assert_eq!(err.to_string(), "insufficient data: have 12 bars, need 50");
    }

    #[test]
    fn configuration_helper() {
        let err = TradesimError::configuration("unknown indicator id 'fast'");
        assert!(matches!(err, TradesimError::Configuration { .. }));
        assert!(err.to_string().contains("fast"));
    }

    #[test]
    fn invalid_helper_names_section_and_key() {
        let err = TradesimError::invalid("risk", "lot_split", "must be in (0, 1)");
        assert_eq!(
            err.to_string(),
            "invalid config value [risk] lot_split: must be in (0, 1)"
        );
    }
}
