//! Client library for the location provider service.
//!
//! Each [`LbsClient`] is one bus connection and therefore one client
//! identity. Dropping it closes the socket; the server then treats the
//! identity as departed and reclaims any references it still holds.

pub mod client;
pub mod error;

pub use client::LbsClient;
pub use error::ClientError;
