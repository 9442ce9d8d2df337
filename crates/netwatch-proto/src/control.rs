use serde::{Deserialize, Serialize};

use crate::codec::{decode, encode};
use crate::error::{ProtoError, Result};

/// Disambiguates how a [`ControlMessage`] payload should be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    /// Carries a serialized `Task`, not the last of the batch.
    Task,
    /// Carries a serialized `Task`, the last of the batch.
    FinalTask,
    /// Carries a serialized `Report`.
    Report,
    /// Empty payload, sent for deviceID identification.
    Identify,
}

impl Tag {
    fn code(self) -> char {
        match self {
            Tag::Task => 't',
            Tag::FinalTask => 'f',
            Tag::Report => 'r',
            Tag::Identify => 'c',
        }
    }

    fn from_code(code: char) -> Result<Self> {
        match code {
            't' => Ok(Tag::Task),
            'f' => Ok(Tag::FinalTask),
            'r' => Ok(Tag::Report),
            'c' => Ok(Tag::Identify),
            other => Err(ProtoError::UnknownTag(other)),
        }
    }
}

/// The NetTask envelope carried in every datagram's payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage {
    pub author: String,
    pub tag: Tag,
    pub payload: Vec<u8>,
}

impl ControlMessage {
    pub fn identify(author: impl Into<String>) -> Self {
        ControlMessage { author: author.into(), tag: Tag::Identify, payload: Vec::new() }
    }

    pub fn task(author: impl Into<String>, payload: Vec<u8>, is_final: bool) -> Self {
        ControlMessage {
            author: author.into(),
            tag: if is_final { Tag::FinalTask } else { Tag::Task },
            payload,
        }
    }

    pub fn report(author: impl Into<String>, payload: Vec<u8>) -> Self {
        ControlMessage { author: author.into(), tag: Tag::Report, payload }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let wire = WireControlMessage { a: self.author.clone(), t: self.tag.code(), p: self.payload.clone() };
        encode(&wire)
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let wire: WireControlMessage = decode(data)?;
        Ok(ControlMessage { author: wire.a, tag: Tag::from_code(wire.t)?, payload: wire.p })
    }
}

#[derive(Serialize, Deserialize)]
struct WireControlMessage {
    a: String,
    t: char,
    #[serde(with = "serde_bytes")]
    p: Vec<u8>,
}
