use thiserror::Error;

/// Decode/encode failures for the wire codecs (datagram, control message,
/// task, report, alert). A decode failure is never fatal by itself — callers
/// drop the offending frame and log; see the transport layer for recovery.
#[derive(Error, Debug)]
pub enum ProtoError {
    #[error("I/O error while (de)compressing a frame: {0}")]
    Io(#[from] std::io::Error),
    #[error("msgpack encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("msgpack decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("unknown control message tag: {0:?}")]
    UnknownTag(char),
    #[error("unknown spike code: {0:?}")]
    UnknownSpikeCode(char),
    #[error("alert report claims interface-traffic spiked but names no interfaces")]
    TrafficAlertWithoutInterfaces,
    #[error("encoded frame is {0} bytes, exceeds the 1024 B datagram limit")]
    FrameTooLarge(usize),
}

pub type Result<T> = std::result::Result<T, ProtoError>;
