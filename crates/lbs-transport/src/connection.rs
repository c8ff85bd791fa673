use std::collections::VecDeque;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use lbs_protocol::wire::{self, Frame, HEADER_SIZE};
use lbs_protocol::Message;

use crate::error::TransportError;

/// Whether this side of the connection is the server or client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionRole {
    Server,
    Client,
}

/// A framed message stream to a peer on the local bus socket.
///
/// A reader task owns the read half and hands decoded frames over a
/// channel, so [`recv`](Self::recv) can be raced in `select!` without losing
/// a partially read frame. Signals that arrive while [`call`](Self::call)
/// waits for its reply are queued for [`next_signal`](Self::next_signal).
pub struct LbsConnection<S> {
    role: ConnectionRole,
    writer: WriteHalf<S>,
    incoming: mpsc::Receiver<Result<Frame, TransportError>>,
    reader: JoinHandle<()>,
    next_serial: u32,
    signals: VecDeque<Message>,
}

impl<S> LbsConnection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(role: ConnectionRole, stream: S) -> Self {
        let (read_half, writer) = tokio::io::split(stream);
        let (tx, incoming) = mpsc::channel(64);
        let reader = tokio::spawn(read_loop(role, read_half, tx));
        Self {
            role,
            writer,
            incoming,
            reader,
            next_serial: 1,
            signals: VecDeque::new(),
        }
    }

    /// Send a call and return the serial it went out with.
    pub async fn send(&mut self, msg: &Message) -> Result<u32, TransportError> {
        let serial = self.take_serial();
        self.write_frame(msg, serial, 0).await?;
        Ok(serial)
    }

    /// Answer the call that carried `serial`.
    pub async fn reply(&mut self, serial: u32, msg: &Message) -> Result<(), TransportError> {
        let own = self.take_serial();
        self.write_frame(msg, own, serial).await
    }

    /// Push an unsolicited signal to the peer.
    pub async fn signal(&mut self, msg: &Message) -> Result<(), TransportError> {
        let serial = self.take_serial();
        self.write_frame(msg, serial, 0).await
    }

    /// Receive the next frame in arrival order. Cancel safe.
    pub async fn recv_frame(&mut self) -> Result<Frame, TransportError> {
        match self.incoming.recv().await {
            Some(Ok(frame)) => {
                trace!(
                    role = ?self.role,
                    kind = frame.message.kind(),
                    serial = frame.header.serial,
                    "frame received"
                );
                Ok(frame)
            }
            Some(Err(e)) => Err(e),
            None => Err(TransportError::ConnectionClosed),
        }
    }

    /// Receive the next message, whatever its delivery.
    pub async fn recv(&mut self) -> Result<Message, TransportError> {
        Ok(self.recv_frame().await?.message)
    }

    /// Send a call and wait for its reply. Signals received in the
    /// meantime are queued.
    pub async fn call(&mut self, msg: &Message) -> Result<Message, TransportError> {
        let serial = self.send(msg).await?;
        loop {
            let frame = self.recv_frame().await?;
            if frame.header.is_signal() {
                self.signals.push_back(frame.message);
            } else if frame.header.is_reply() && frame.header.reply_serial == serial {
                return Ok(frame.message);
            } else {
                return Err(TransportError::UnexpectedFrame {
                    kind: frame.message.kind(),
                    awaiting: serial,
                });
            }
        }
    }

    /// Next signal from the peer, queued or awaited.
    pub async fn next_signal(&mut self) -> Result<Message, TransportError> {
        if let Some(msg) = self.signals.pop_front() {
            return Ok(msg);
        }
        let frame = self.recv_frame().await?;
        if frame.header.is_signal() {
            Ok(frame.message)
        } else {
            Err(TransportError::UnexpectedFrame {
                kind: frame.message.kind(),
                awaiting: 0,
            })
        }
    }

    pub fn role(&self) -> ConnectionRole {
        self.role
    }

    fn take_serial(&mut self) -> u32 {
        let serial = self.next_serial;
        self.next_serial = self.next_serial.checked_add(1).unwrap_or(1);
        serial
    }

    async fn write_frame(
        &mut self,
        msg: &Message,
        serial: u32,
        reply_serial: u32,
    ) -> Result<(), TransportError> {
        let frame = wire::encode_frame(msg, serial, reply_serial)?;
        self.writer.write_all(&frame).await?;
        self.writer.flush().await?;
        trace!(role = ?self.role, kind = msg.kind(), serial, reply_serial, "frame sent");
        Ok(())
    }
}

impl<S> Drop for LbsConnection<S> {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Open a client connection to the server socket at `path`.
#[cfg(unix)]
pub async fn connect_unix(
    path: &str,
) -> Result<LbsConnection<tokio::net::UnixStream>, TransportError> {
    let stream = tokio::net::UnixStream::connect(path).await?;
    debug!("connected to {}", path);
    Ok(LbsConnection::new(ConnectionRole::Client, stream))
}

async fn read_loop<S: AsyncRead>(
    role: ConnectionRole,
    mut reader: ReadHalf<S>,
    tx: mpsc::Sender<Result<Frame, TransportError>>,
) {
    loop {
        let result = read_frame(&mut reader).await;
        let fatal = matches!(&result, Err(e) if !e.is_recoverable());
        if let Err(e) = &result {
            debug!(role = ?role, "read failed: {}", e);
        }
        if tx.send(result).await.is_err() || fatal {
            break;
        }
    }
}

/// Read a single frame.
///
/// A clean end of stream before the header maps to `ConnectionClosed`.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Frame, TransportError> {
    let mut header_buf = [0u8; HEADER_SIZE];
    match reader.read_exact(&mut header_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(TransportError::ConnectionClosed);
        }
        Err(e) => return Err(e.into()),
    }

    let header = wire::decode_header(&header_buf)?;
    let mut payload = vec![0u8; header.length as usize];
    reader.read_exact(&mut payload).await?;
    let message = wire::decode_payload(&header, &payload).map_err(|source| {
        TransportError::BadPayload {
            serial: header.serial,
            source,
        }
    })?;
    Ok(Frame { header, message })
}
