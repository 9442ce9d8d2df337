use thiserror::Error;

/// Configuration errors are fatal at startup only: task storage is
/// read-only after load, so none of these are encountered mid-run.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("config file declares no tasks; a collector with no task table is not a meaningful running state")]
    NoTasks,
}

pub type Result<T> = std::result::Result<T, ConfigError>;
