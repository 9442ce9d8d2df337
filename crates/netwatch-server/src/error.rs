use thiserror::Error;

use crate::logsink::LogSinkError;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("transport error: {0}")]
    Transport(#[from] netwatch_transport::TransportError),
    #[error("wire codec error: {0}")]
    Proto(#[from] netwatch_proto::ProtoError),
    #[error("log sink error: {0}")]
    LogSink(#[from] LogSinkError),
}

pub type Result<T> = std::result::Result<T, ServerError>;
