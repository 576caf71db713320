use std::path::PathBuf;

use thiserror::Error;

use crate::reaction::ReactionError;
use crate::source::SourceError;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Job source error: {0}")]
    Source(#[from] SourceError),

    #[error("Reaction error: {0}")]
    Reaction(#[from] ReactionError),

    #[error("State store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    Missing(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("no watch targets configured under [companies]")]
    NoTargets,

    #[error("invalid board slug {slug:?} for {kind}")]
    InvalidTarget { kind: String, slug: String },

    #[error("invalid pattern {pattern:?} in {field}: {source}")]
    InvalidPattern {
        field: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("missing required environment variable {0}")]
    MissingEnv(&'static str),

    #[error("invalid value {value:?} for {name}")]
    InvalidEnv { name: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt state file {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_wraps_into_watch_error() {
        let err: WatchError = ConfigError::NoTargets.into();
        assert_eq!(
            err.to_string(),
            "Config error: no watch targets configured under [companies]"
        );
    }

    #[test]
    fn missing_file_display_includes_path() {
        let err = ConfigError::Missing(PathBuf::from("/etc/jobwatch.toml"));
        assert_eq!(err.to_string(), "config file not found: /etc/jobwatch.toml");
    }

    #[test]
    fn errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<WatchError>();
    }
}
