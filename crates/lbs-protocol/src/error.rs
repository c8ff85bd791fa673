use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error,
         rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
pub enum ProtocolError {
    #[error("invalid parameter: {0}")]
    Parameter(String),

    #[error("invalid resource class: {0}")]
    InvalidResource(i32),

    #[error("protocol version mismatch: server {server}, client {client}")]
    VersionMismatch { server: u32, client: u32 },

    #[error("peer has not said Hello")]
    NotRegistered,

    #[error("unsupported message: {0}")]
    UnsupportedMessage(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("server disconnected")]
    Disconnected,
}
