//! Frame codec: `opcode: u32 LE`, `length: u32 LE`, then `length` bytes of
//! UTF-8 JSON.

use bytes::{Buf, BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder};

use crate::IpcError;

pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

const HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Handshake = 0,
    Frame = 1,
    Close = 2,
    Ping = 3,
    Pong = 4,
}

impl TryFrom<u32> for Opcode {
    type Error = IpcError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Opcode::Handshake),
            1 => Ok(Opcode::Frame),
            2 => Ok(Opcode::Close),
            3 => Ok(Opcode::Ping),
            4 => Ok(Opcode::Pong),
            other => Err(IpcError::Codec(format!("unknown opcode {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: Opcode,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn json<T: Serialize>(opcode: Opcode, body: &T) -> Result<Self, IpcError> {
        Ok(Self {
            opcode,
            payload: serde_json::to_vec(body)?,
        })
    }

    pub fn decode_body<T: DeserializeOwned>(&self) -> Result<T, IpcError> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}

#[derive(Debug, Default)]
pub struct IpcCodec;

impl Decoder for IpcCodec {
    type Item = Frame;
    type Error = IpcError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, IpcError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let opcode = u32::from_le_bytes([src[0], src[1], src[2], src[3]]);
        let len = u32::from_le_bytes([src[4], src[5], src[6], src[7]]);
        if len > MAX_FRAME_LEN {
            return Err(IpcError::Codec(format!(
                "declared length {len} exceeds max {MAX_FRAME_LEN}"
            )));
        }
        let opcode = Opcode::try_from(opcode)?;

        let total = HEADER_LEN + len as usize;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let payload = src.split_to(len as usize).to_vec();
        Ok(Some(Frame { opcode, payload }))
    }
}

impl Encoder<Frame> for IpcCodec {
    type Error = IpcError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), IpcError> {
        let len = u32::try_from(frame.payload.len())
            .ok()
            .filter(|len| *len <= MAX_FRAME_LEN)
            .ok_or_else(|| {
                IpcError::Codec(format!("payload of {} bytes is too large", frame.payload.len()))
            })?;

        dst.reserve(HEADER_LEN + frame.payload.len());
        dst.put_u32_le(frame.opcode as u32);
        dst.put_u32_le(len);
        dst.put_slice(&frame.payload);
        Ok(())
    }
}
