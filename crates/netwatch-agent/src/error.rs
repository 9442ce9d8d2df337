use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("transport error: {0}")]
    Transport(#[from] netwatch_transport::TransportError),
    #[error("wire codec error: {0}")]
    Proto(#[from] netwatch_proto::ProtoError),
    #[error("server host {0:?} did not resolve to any address")]
    UnresolvedHost(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;
