use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("wire codec error: {0}")]
    Proto(#[from] netwatch_proto::ProtoError),
    #[error("retransmission exhausted: no matching ACK after {0} attempts")]
    RetransmissionExhausted(u32),
}

pub type Result<T> = std::result::Result<T, TransportError>;
