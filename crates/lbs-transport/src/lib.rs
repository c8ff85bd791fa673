pub mod connection;
pub mod error;

#[cfg(unix)]
pub use connection::connect_unix;
pub use connection::{read_frame, ConnectionRole, LbsConnection};
pub use error::TransportError;
