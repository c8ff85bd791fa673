use lbs_protocol::{ProtocolError, ResourceClass};

/// Failure taxonomy of the arbitration core.
///
/// Only the parameter errors are ever returned to a caller. The anomaly and
/// invariant variants are recorded through the anomaly hook and absorbed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArbiterError {
    #[error("invalid parameter: {0}")]
    Parameter(String),

    /// A wire method number outside the resource classes.
    #[error("invalid resource class: {0}")]
    InvalidResource(i32),

    #[error("release of {resource} by {client} with no outstanding reference")]
    ReleaseAtZero { client: String, resource: ResourceClass },

    #[error("release of {resource} by untracked client {client}")]
    UnknownClient { client: String, resource: ResourceClass },

    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),
}

impl ArbiterError {
    pub fn is_parameter_error(&self) -> bool {
        matches!(self, ArbiterError::Parameter(_) | ArbiterError::InvalidResource(_))
    }

    /// Protocol anomalies are logged and absorbed, never fatal.
    pub fn is_protocol_anomaly(&self) -> bool {
        matches!(self, ArbiterError::ReleaseAtZero { .. } | ArbiterError::UnknownClient { .. })
    }
}

impl From<ProtocolError> for ArbiterError {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::InvalidResource(method) => ArbiterError::InvalidResource(method),
            ProtocolError::Parameter(msg) => ArbiterError::Parameter(msg),
            other => ArbiterError::Parameter(other.to_string()),
        }
    }
}

impl From<ArbiterError> for ProtocolError {
    fn from(e: ArbiterError) -> Self {
        match e {
            ArbiterError::InvalidResource(method) => ProtocolError::InvalidResource(method),
            // the wire variant adds its own prefix
            ArbiterError::Parameter(msg) => ProtocolError::Parameter(msg),
            other => ProtocolError::Parameter(other.to_string()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
