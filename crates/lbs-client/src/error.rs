use lbs_protocol::ProtocolError;
use lbs_transport::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("server rejected call: {0}")]
    Server(ProtocolError),

    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),
}
