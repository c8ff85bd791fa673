/// Per-connection state on the server side.
///
/// The unique name is reserved when the connection is accepted but only
/// becomes the client's identity once the Hello handshake succeeds.
pub struct PeerSession {
    pub peer_id: u64,
    unique_name: String,
    client_name: Option<String>,
}

impl PeerSession {
    pub fn new(peer_id: u64) -> Self {
        Self {
            peer_id,
            unique_name: format!(":1.{}", peer_id),
            client_name: None,
        }
    }

    /// Complete the handshake and return the identity to announce.
    pub fn register(&mut self, client_name: String) -> &str {
        self.client_name = Some(client_name);
        &self.unique_name
    }

    pub fn is_registered(&self) -> bool {
        self.client_name.is_some()
    }

    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }

    /// Name the client gave in its Hello, if it sent one.
    pub fn client_name(&self) -> Option<&str> {
        self.client_name.as_deref()
    }
}
