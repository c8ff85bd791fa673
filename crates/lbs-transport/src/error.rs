use lbs_protocol::wire::WireError;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("wire format error: {0}")]
    Wire(#[from] WireError),

    #[error("connection closed")]
    ConnectionClosed,

    /// The frame was read in full but its payload did not decode.
    #[error("undecodable payload in frame {serial}: {source}")]
    BadPayload { serial: u32, source: WireError },

    #[error("unexpected {kind} while awaiting reply to serial {awaiting}")]
    UnexpectedFrame { kind: &'static str, awaiting: u32 },
}

impl TransportError {
    /// Whether the stream is still usable after this error.
    ///
    /// A payload that fails to decode has been read in full, so the next
    /// frame starts on a clean boundary. Anything else leaves the stream in
    /// an unknown position.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TransportError::BadPayload { .. } | TransportError::UnexpectedFrame { .. }
        )
    }
}
