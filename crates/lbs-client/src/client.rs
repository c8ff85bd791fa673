use tokio::net::UnixStream;
use tracing::{debug, info};

use lbs_protocol::{ArbiterSnapshot, Message, ResourceClass, PROTOCOL_VERSION};
use lbs_transport::LbsConnection;

use crate::error::ClientError;

/// A registered connection to the provider service.
pub struct LbsClient {
    conn: LbsConnection<UnixStream>,
    unique_name: String,
}

impl LbsClient {
    /// Connect to the socket at `path` and perform the Hello/Welcome handshake.
    pub async fn connect(path: &str, name: &str) -> Result<Self, ClientError> {
        let mut conn = lbs_transport::connect_unix(path).await?;

        let hello = Message::Hello {
            protocol_version: PROTOCOL_VERSION,
            name: name.to_string(),
        };
        let unique_name = match conn.call(&hello).await? {
            Message::Welcome { unique_name } => unique_name,
            other => return Err(unexpected(other)),
        };
        info!("registered with provider service as {}", unique_name);

        Ok(Self { conn, unique_name })
    }

    /// The bus name the server assigned to this connection.
    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }

    pub async fn add_reference(&mut self, resource: ResourceClass) -> Result<(), ClientError> {
        self.add_reference_raw(resource.method()).await
    }

    /// Add a reference by raw method number, bypassing client-side validation.
    pub async fn add_reference_raw(&mut self, method: i32) -> Result<(), ClientError> {
        self.expect_ack(Message::AddReference { method }).await
    }

    pub async fn remove_reference(&mut self, resource: ResourceClass) -> Result<(), ClientError> {
        self.remove_reference_raw(resource.method()).await
    }

    pub async fn remove_reference_raw(&mut self, method: i32) -> Result<(), ClientError> {
        self.expect_ack(Message::RemoveReference { method }).await
    }

    /// Ask for position updates of `resource` at least every `interval_ms`.
    pub async fn request_interval(
        &mut self,
        resource: ResourceClass,
        interval_ms: u32,
    ) -> Result<(), ClientError> {
        self.expect_ack(Message::RequestInterval {
            method: resource.method(),
            interval_ms,
        })
        .await
    }

    /// Provider name and description, as configured on the server.
    pub async fn provider_info(&mut self) -> Result<(Option<String>, Option<String>), ClientError> {
        match self.call(Message::GetProviderInfo).await? {
            Message::ProviderInfo { name, description } => Ok((name, description)),
            other => Err(unexpected(other)),
        }
    }

    pub async fn status(&mut self) -> Result<i32, ClientError> {
        match self.call(Message::GetStatus).await? {
            Message::Status { status } => Ok(status),
            other => Err(unexpected(other)),
        }
    }

    /// Current shutdown vector, tracked clients and effective intervals.
    pub async fn state(&mut self) -> Result<ArbiterSnapshot, ClientError> {
        match self.call(Message::QueryState).await? {
            Message::StateSnapshot(snapshot) => Ok(snapshot),
            other => Err(unexpected(other)),
        }
    }

    pub async fn ping(&mut self) -> Result<(), ClientError> {
        match self.call(Message::Ping).await? {
            Message::Pong => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Wait for the next status change broadcast by the provider.
    ///
    /// Changes that arrived while another call was in flight are returned
    /// first, in order.
    pub async fn next_status_change(&mut self) -> Result<(ResourceClass, i32), ClientError> {
        match self.conn.next_signal().await? {
            Message::StatusChanged { method, status } => {
                let resource = ResourceClass::try_from(method).map_err(ClientError::Server)?;
                Ok((resource, status))
            }
            other => Err(unexpected(other)),
        }
    }

    async fn expect_ack(&mut self, msg: Message) -> Result<(), ClientError> {
        match self.call(msg).await? {
            Message::Ack => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Send a request; server-reported errors come back as `ClientError::Server`.
    async fn call(&mut self, msg: Message) -> Result<Message, ClientError> {
        debug!(client = %self.unique_name, kind = msg.kind(), "calling provider");
        match self.conn.call(&msg).await? {
            Message::Error(e) => Err(ClientError::Server(e)),
            reply => Ok(reply),
        }
    }
}

fn unexpected(msg: Message) -> ClientError {
    match msg {
        Message::Error(e) => ClientError::Server(e),
        other => ClientError::UnexpectedReply(other.kind().to_string()),
    }
}
