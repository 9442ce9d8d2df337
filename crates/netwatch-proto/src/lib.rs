pub mod alert;
pub mod codec;
pub mod control;
pub mod datagram;
pub mod error;
pub mod report;
pub mod task;

pub use alert::{derive_alert, Alert, SpikeKind};
pub use control::{ControlMessage, Tag};
pub use datagram::{Datagram, Endpoint, Flags};
pub use error::{ProtoError, Result};
pub use report::{Measurements, Report};
pub use task::{AlertThresholds, Task};
