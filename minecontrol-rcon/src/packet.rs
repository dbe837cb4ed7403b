//! The RCON wire format.
//!
//! Every packet is laid out as follows, with integers in little-endian order:
//!
//! | Field       | Size     | Notes                                       |
//! |-------------|----------|---------------------------------------------|
//! | length      | `i32`    | Number of bytes following this field        |
//! | request id  | `i32`    | Chosen by the client, echoed by the server  |
//! | type        | `i32`    | 3 for login, 2 for a command, 0 for output  |
//! | payload     | variable | Text                                        |
//! | padding     | 2 bytes  | Two null bytes                              |

use std::borrow::Cow;
use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, warn};

use crate::{read_error, RconError};

/// Size of the request id, the type and the padding, i.e. everything `length` counts besides
/// the payload.
pub const HEADER_LEN: usize = 10;

/// Largest payload a server sends in a single response packet.
pub const MAX_PAYLOAD_LEN: usize = 4096;

/// Largest payload a server accepts in a request (a 1460 byte request, less the four fields).
pub const MAX_REQUEST_PAYLOAD_LEN: usize = 1446;

/// The `request_id` servers answer a login with when the password is wrong.
pub const AUTH_FAILURE_ID: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    /// Sent by the client with the password as payload.
    Login,
    /// Sent by the client with a command as payload. Also what the server answers a successful
    /// login with.
    Command,
    /// Output of a command, sent by the server.
    Response,
    Unknown(i32),
}

impl PacketType {
    pub fn as_i32(self) -> i32 {
        match self {
            PacketType::Login => 3,
            PacketType::Command => 2,
            PacketType::Response => 0,
            PacketType::Unknown(raw) => raw,
        }
    }

    pub fn from_i32(raw: i32) -> Self {
        match raw {
            3 => PacketType::Login,
            2 => PacketType::Command,
            0 => PacketType::Response,
            raw => PacketType::Unknown(raw),
        }
    }
}

/// How strictly the two trailing padding bytes of an incoming packet are checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PaddingMode {
    /// Accept any two bytes.
    #[default]
    Lenient,
    /// Reject packets whose padding is not `0x00 0x00`.
    Strict,
}

/// A single RCON packet.
///
/// Packets are only created through [`Packet::new`] or [`Packet::decode`], so `length` always
/// matches the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    length: i32,
    request_id: i32,
    packet_type: PacketType,
    payload: Vec<u8>,
}

impl Packet {
    /// Builds a packet, computing its `length` from the payload.
    pub fn new(
        request_id: i32,
        packet_type: PacketType,
        payload: impl Into<Vec<u8>>,
    ) -> crate::Result<Self> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(RconError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD_LEN,
            }
            .into());
        }

        Ok(Packet {
            length: (HEADER_LEN + payload.len()) as i32,
            request_id,
            packet_type,
            payload,
        })
    }

    pub fn length(&self) -> i32 {
        self.length
    }

    pub fn request_id(&self) -> i32 {
        self.request_id
    }

    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The payload as text. Invalid UTF-8 is replaced rather than rejected.
    pub fn payload_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Writes the packet and flushes the writer.
    pub fn encode<W: Write>(&self, w: &mut W) -> crate::Result<()> {
        self.write_fields(w).map_err(RconError::WriteFailed)?;
        Ok(())
    }

    fn write_fields<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_i32::<LittleEndian>(self.length)?;
        w.write_i32::<LittleEndian>(self.request_id)?;
        w.write_i32::<LittleEndian>(self.packet_type.as_i32())?;
        w.write_all(&self.payload)?;
        w.write_all(&[0, 0])?;
        w.flush()
    }

    /// Reads one packet.
    pub fn decode<R: Read>(r: &mut R, padding: PaddingMode) -> crate::Result<Self> {
        let length = r.read_i32::<LittleEndian>().map_err(read_error)?;
        Self::decode_after_length(length, r, padding)
    }

    /// Reads the remainder of a packet whose `length` field has already been consumed.
    pub(crate) fn decode_after_length<R: Read>(
        length: i32,
        r: &mut R,
        padding: PaddingMode,
    ) -> crate::Result<Self> {
        let payload_len = payload_len(length)?;

        let request_id = r.read_i32::<LittleEndian>().map_err(read_error)?;
        let packet_type = r.read_i32::<LittleEndian>().map_err(read_error)?;

        let mut payload = vec![0; payload_len];
        r.read_exact(&mut payload).map_err(read_error)?;

        let mut pad = [0u8; 2];
        r.read_exact(&mut pad).map_err(read_error)?;
        if pad != [0, 0] {
            match padding {
                PaddingMode::Strict => {
                    return Err(RconError::MalformedPacket(format!(
                        "expected null padding, found {:#04x} {:#04x}",
                        pad[0], pad[1]
                    ))
                    .into())
                }
                PaddingMode::Lenient => {
                    warn!("Ignoring non-null packet padding {:?}", pad);
                }
            }
        }

        debug!(
            "Decoded packet id={} type={} with {} byte payload",
            request_id, packet_type, payload_len
        );

        Ok(Packet {
            length,
            request_id,
            packet_type: PacketType::from_i32(packet_type),
            payload,
        })
    }
}

/// Validates a `length` field and returns the payload size it announces.
pub(crate) fn payload_len(length: i32) -> crate::Result<usize> {
    if length < HEADER_LEN as i32 {
        return Err(RconError::MalformedPacket(format!(
            "length {} is shorter than the {} byte header",
            length, HEADER_LEN
        ))
        .into());
    }

    let payload_len = length as usize - HEADER_LEN;
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(RconError::MalformedPacket(format!(
            "length {} exceeds the largest packet of {} bytes",
            length,
            MAX_PAYLOAD_LEN + HEADER_LEN
        ))
        .into());
    }

    Ok(payload_len)
}

/// Builds an outgoing login or command packet, which servers accept with a shorter payload than
/// they send.
pub(crate) fn request(packet_type: PacketType, payload: &str) -> crate::Result<Packet> {
    if payload.len() > MAX_REQUEST_PAYLOAD_LEN {
        return Err(RconError::PayloadTooLarge {
            len: payload.len(),
            max: MAX_REQUEST_PAYLOAD_LEN,
        }
        .into());
    }

    Packet::new(crate::next_request_id(), packet_type, payload)
}
