// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types for the log harvester.

/// Configuration errors. All of these are raised before a harvest loop starts.
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("multiline of what={0} is not supported")]
    InvalidMultilineMode(String),

    #[error("Invalid multiline pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Failure of a single `read_line` call.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// No complete line arrived within the idle timeout.
    #[error("timed out waiting for data")]
    EofTimeout,

    #[error("read error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = HarvestError::InvalidMultilineMode("sideways".to_string());
        assert_eq!(error.to_string(), "multiline of what=sideways is not supported");

        let error = HarvestError::InvalidConfig("no sources".to_string());
        assert_eq!(error.to_string(), "Invalid configuration: no sources");
    }

    #[test]
    fn test_invalid_pattern_keeps_source() {
        #[allow(clippy::invalid_regex)]
        let source = regex::Regex::new("(").unwrap_err();
        let error = HarvestError::InvalidPattern {
            pattern: "(".to_string(),
            source,
        };
        assert!(error.to_string().starts_with("Invalid multiline pattern '('"));
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn test_read_error_from_io() {
        let error: ReadError = std::io::Error::other("boom").into();
        assert!(matches!(error, ReadError::Io(_)));
        assert_eq!(error.to_string(), "read error: boom");
    }
}
