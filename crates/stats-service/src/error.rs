// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::stream::StreamError;

/// Errors surfaced to callers of the stats service lifecycle.
///
/// Steady-state failures (snapshot errors, registration errors) never show up
/// here; they are logged and swallowed by the background tasks.
#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error("error opening stats service: service already open")]
    AlreadyOpen,

    #[error("error closing stats service: service not open")]
    NotOpen,

    #[error("error opening stats service: {0}")]
    Stream(#[from] StreamError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = StatsError::InvalidConfig("stats interval must be greater than 0".to_string());
        assert_eq!(
            error.to_string(),
            "Invalid configuration: stats interval must be greater than 0"
        );
    }

    #[test]
    fn test_not_open_mentions_state() {
        assert!(StatsError::NotOpen.to_string().contains("service not open"));
    }

    #[test]
    fn test_stream_error_converts() {
        let error: StatsError = StreamError::UnknownStream("stats".into()).into();
        assert!(matches!(error, StatsError::Stream(_)));
        assert!(error.to_string().contains("stats"));
    }
}
