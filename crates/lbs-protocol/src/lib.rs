pub mod resource;
pub mod messages;
pub mod wire;
pub mod error;

pub use resource::ResourceClass;
pub use messages::{ArbiterSnapshot, Message, PROTOCOL_VERSION};
pub use error::ProtocolError;
