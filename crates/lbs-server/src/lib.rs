pub mod provider;
pub mod server;
pub mod session;

pub use provider::{ProviderController, ProviderHooks};
pub use server::{LbsServer, ServerMetrics};
