//! # Summary
//!
//! Wire framing: `bincode`-encoded `Frame`s over a length-delimited
//! transport (§4.1, §4.6). The length prefix makes every message
//! self-delimited, so a partial read is simply buffered by
//! `tokio_util::codec::LengthDelimitedCodec` until a complete frame is
//! available — the Rust-native replacement for the original's
//! hand-rolled partial-read buffering.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use crate::message::{self, Frame, MessageError};

pub struct FrameCodec {
    inner: LengthDelimitedCodec,
}

impl Default for FrameCodec {
    fn default() -> Self {
        FrameCodec { inner: LengthDelimitedCodec::new() }
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = MessageError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, MessageError> {
        let Some(bytes) = self.inner.decode(src)? else {
            return Ok(None);
        };
        message::decode(&bytes).map(Some)
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = MessageError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), MessageError> {
        let bytes = message::encode(&frame)?;
        self.inner.encode(Bytes::from(bytes), dst)?;
        Ok(())
    }
}
