pub mod endpoint;
pub mod error;
pub mod framing;
pub mod ports;

pub use endpoint::ReliableEndpoint;
pub use error::{Result, TransportError};
pub use framing::{read_framed, write_framed};
pub use ports::{sample_excluding, PortAllocator};
