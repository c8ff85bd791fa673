//! Frame codec for the provider bus socket.
//!
//! ```text
//! 0      2       3          7                11         15
//! +------+-------+----------+----------------+----------+---------
//! | "LB" | flags | serial   | reply_serial   | length   | payload
//! +------+-------+----------+----------------+----------+---------
//! ```
//!
//! Every frame carries the sender's serial. Replies name the serial of the
//! call they answer in `reply_serial`; calls and signals leave it zero. The
//! payload is an rkyv archive of [`Message`], LZ4-compressed when large.

use crate::messages::Message;

pub const MAGIC: [u8; 2] = *b"LB";

pub const HEADER_SIZE: usize = 15;

/// Largest payload accepted in either direction.
pub const MAX_PAYLOAD: u32 = 1 << 20;

/// Archives above this size are worth trying to compress.
const COMPRESS_ABOVE: usize = 512;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FrameFlags: u8 {
        const COMPRESSED = 1 << 0;
        /// Answer to a call; `reply_serial` is set.
        const REPLY      = 1 << 1;
        /// Reply carrying `Message::Error`.
        const ERROR      = 1 << 2;
        /// Unsolicited broadcast from the service.
        const SIGNAL     = 1 << 3;
    }
}

/// How a message travels: what the peer may send it as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Call,
    Reply,
    Error,
    Signal,
}

impl Delivery {
    pub fn of(msg: &Message) -> Self {
        match msg {
            Message::Error(_) => Delivery::Error,
            Message::StatusChanged { .. } => Delivery::Signal,
            Message::Welcome { .. }
            | Message::Ack
            | Message::ProviderInfo { .. }
            | Message::Status { .. }
            | Message::StateSnapshot(_)
            | Message::Pong => Delivery::Reply,
            _ => Delivery::Call,
        }
    }

    fn flags(self) -> FrameFlags {
        match self {
            Delivery::Call => FrameFlags::empty(),
            Delivery::Reply => FrameFlags::REPLY,
            Delivery::Error => FrameFlags::REPLY | FrameFlags::ERROR,
            Delivery::Signal => FrameFlags::SIGNAL,
        }
    }

    fn from_flags(flags: FrameFlags) -> Option<Self> {
        let kind = flags - FrameFlags::COMPRESSED;
        [Delivery::Call, Delivery::Reply, Delivery::Error, Delivery::Signal]
            .into_iter()
            .find(|d| d.flags() == kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub flags: FrameFlags,
    pub serial: u32,
    pub reply_serial: u32,
    pub length: u32,
}

impl FrameHeader {
    pub fn delivery(&self) -> Delivery {
        // validated on decode
        Delivery::from_flags(self.flags).unwrap_or(Delivery::Call)
    }

    pub fn is_signal(&self) -> bool {
        self.flags.contains(FrameFlags::SIGNAL)
    }

    pub fn is_reply(&self) -> bool {
        self.flags.contains(FrameFlags::REPLY)
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub header: FrameHeader,
    pub message: Message,
}

/// Encode `msg` as a frame. `reply_serial` must be non-zero exactly when the
/// message is a reply or an error.
pub fn encode_frame(msg: &Message, serial: u32, reply_serial: u32) -> Result<Vec<u8>, WireError> {
    let delivery = Delivery::of(msg);
    let answers = matches!(delivery, Delivery::Reply | Delivery::Error);
    if answers != (reply_serial != 0) {
        return Err(WireError::ReplySerial {
            kind: msg.kind(),
            reply_serial,
        });
    }

    let (payload, compressed) = pack(msg)?;
    let length = u32::try_from(payload.len())
        .ok()
        .filter(|&len| len <= MAX_PAYLOAD)
        .ok_or(WireError::FrameTooLarge(payload.len()))?;

    let mut flags = delivery.flags();
    flags.set(FrameFlags::COMPRESSED, compressed);

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&MAGIC);
    frame.push(flags.bits());
    frame.extend_from_slice(&serial.to_le_bytes());
    frame.extend_from_slice(&reply_serial.to_le_bytes());
    frame.extend_from_slice(&length.to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Parse and validate a frame header.
pub fn decode_header(bytes: &[u8; HEADER_SIZE]) -> Result<FrameHeader, WireError> {
    if bytes[..2] != MAGIC {
        return Err(WireError::InvalidMagic);
    }
    let flags = FrameFlags::from_bits(bytes[2]).ok_or(WireError::InvalidFlags(bytes[2]))?;
    let delivery = Delivery::from_flags(flags).ok_or(WireError::InvalidFlags(bytes[2]))?;

    let word = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
    let header = FrameHeader {
        flags,
        serial: word(3),
        reply_serial: word(7),
        length: word(11),
    };

    if header.length > MAX_PAYLOAD {
        return Err(WireError::FrameTooLarge(header.length as usize));
    }
    let answers = matches!(delivery, Delivery::Reply | Delivery::Error);
    if answers != (header.reply_serial != 0) {
        return Err(WireError::InvalidFlags(bytes[2]));
    }
    Ok(header)
}

/// Decode the payload that follows `header`. The message must be of the
/// kind the header announces.
pub fn decode_payload(header: &FrameHeader, payload: &[u8]) -> Result<Message, WireError> {
    let message = unpack(payload, header.flags.contains(FrameFlags::COMPRESSED))?;
    let announced = header.delivery();
    if Delivery::of(&message) != announced {
        return Err(WireError::DeliveryMismatch {
            kind: message.kind(),
            announced,
        });
    }
    Ok(message)
}

fn pack(msg: &Message) -> Result<(Vec<u8>, bool), WireError> {
    let archived = rkyv::to_bytes::<rkyv::rancor::Error>(msg)
        .map_err(|e| WireError::Serialization(e.to_string()))?;
    if archived.len() > COMPRESS_ABOVE {
        let compressed = lz4_flex::compress_prepend_size(&archived);
        if compressed.len() < archived.len() {
            return Ok((compressed, true));
        }
    }
    Ok((archived.to_vec(), false))
}

fn unpack(payload: &[u8], compressed: bool) -> Result<Message, WireError> {
    if compressed {
        let archived = lz4_flex::decompress_size_prepended(payload)
            .map_err(|e| WireError::DecompressionError(e.to_string()))?;
        rkyv::from_bytes::<Message, rkyv::rancor::Error>(&archived)
    } else {
        rkyv::from_bytes::<Message, rkyv::rancor::Error>(payload)
    }
    .map_err(|e| WireError::Serialization(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("invalid magic bytes")]
    InvalidMagic,
    #[error("invalid frame flags {0:#010b}")]
    InvalidFlags(u8),
    #[error("payload of {0} bytes exceeds the frame limit")]
    FrameTooLarge(usize),
    #[error("{kind} cannot be sent with reply serial {reply_serial}")]
    ReplySerial { kind: &'static str, reply_serial: u32 },
    #[error("{kind} arrived in a frame marked {announced:?}")]
    DeliveryMismatch { kind: &'static str, announced: Delivery },
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("decompression error: {0}")]
    DecompressionError(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
