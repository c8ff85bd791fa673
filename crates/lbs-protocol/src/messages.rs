use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Point-in-time view of the arbiter, returned by `QueryState`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize,
         rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
pub struct ArbiterSnapshot {
    /// `shutdown[r]` is true when no client references resource class `r`
    pub shutdown: Vec<bool>,
    /// Number of client identities currently tracked
    pub tracked_clients: u32,
    /// Effective sampling interval per resource class, in milliseconds
    pub effective_intervals: Vec<Option<u32>>,
}

/// Top-level message envelope for the LBS provider protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize,
         rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
pub enum Message {
    // ── Connection establishment ────────────────────────────
    /// Initial handshake from a client.
    Hello {
        protocol_version: u32,
        name: String,
    },

    /// Handshake reply carrying the bus name assigned to the connection.
    Welcome {
        unique_name: String,
    },

    // ── Reference management ────────────────────────────────
    AddReference {
        method: i32,
    },
    RemoveReference {
        method: i32,
    },
    RequestInterval {
        method: i32,
        interval_ms: u32,
    },

    /// Successful completion of a call with no return value.
    Ack,

    // ── Provider queries ────────────────────────────────────
    GetProviderInfo,
    ProviderInfo {
        name: Option<String>,
        description: Option<String>,
    },

    GetStatus,
    Status {
        status: i32,
    },

    QueryState,
    StateSnapshot(ArbiterSnapshot),

    // ── Signals ─────────────────────────────────────────────
    /// Broadcast to every registered client when the provider status of a
    /// resource class changes.
    StatusChanged {
        method: i32,
        status: i32,
    },

    // ── Keepalive ───────────────────────────────────────────
    Ping,
    Pong,

    // ── Error ───────────────────────────────────────────────
    Error(ProtocolError),
}

impl Message {
    /// Short variant name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Hello { .. } => "Hello",
            Message::Welcome { .. } => "Welcome",
            Message::AddReference { .. } => "AddReference",
            Message::RemoveReference { .. } => "RemoveReference",
            Message::RequestInterval { .. } => "RequestInterval",
            Message::Ack => "Ack",
            Message::GetProviderInfo => "GetProviderInfo",
            Message::ProviderInfo { .. } => "ProviderInfo",
            Message::GetStatus => "GetStatus",
            Message::Status { .. } => "Status",
            Message::QueryState => "QueryState",
            Message::StateSnapshot(_) => "StateSnapshot",
            Message::StatusChanged { .. } => "StatusChanged",
            Message::Ping => "Ping",
            Message::Pong => "Pong",
            Message::Error(_) => "Error",
        }
    }
}

/// Current protocol version.
pub const PROTOCOL_VERSION: u32 = 1;
