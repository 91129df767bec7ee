//! Netstring framing for the gateway wire protocol.
//!
//! Every frame travels as `<decimal length>:<payload>,`. The decoder is strict:
//! a bad length prefix, a missing trailing comma or a length past the configured
//! maximum are errors, and the connection carrying them is considered corrupt.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Largest payload accepted by default (16 MiB)
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 0x100_0000;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("invalid netstring length prefix")]
    InvalidLength,

    #[error("netstring of {length} bytes exceeds maximum of {max}")]
    FrameTooLarge { length: usize, max: usize },

    #[error("netstring missing trailing comma")]
    MissingTerminator,

    #[error("stream ended inside a netstring ({0} bytes pending)")]
    Truncated(usize),

    #[error("frame payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A `tokio_util::codec` implementation for netstring frames.
#[derive(Debug, Clone)]
pub struct NetstringCodec {
    max_length: usize,
    max_digits: usize,
    // payload length of the frame currently being read, once its prefix is parsed
    pending: Option<usize>,
}

impl NetstringCodec {
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_FRAME_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            max_digits: max_length.to_string().len(),
            pending: None,
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Encode a single payload into a freshly allocated buffer.
    pub fn encode_to_vec(&mut self, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
        let mut buf = BytesMut::new();
        self.encode(payload, &mut buf)?;
        Ok(buf.to_vec())
    }

    // Parses `<digits>:` at the front of `src`. Returns `Ok(None)` when more bytes are needed.
    fn decode_length(&self, src: &mut BytesMut) -> Result<Option<usize>, FrameError> {
        let Some(colon) = src.iter().position(|b| *b == b':') else {
            if src.len() > self.max_digits {
                return Err(self.too_large_or_invalid(src));
            }
            if !src.iter().all(u8::is_ascii_digit) {
                return Err(FrameError::InvalidLength);
            }
            return Ok(None);
        };

        let digits = &src[..colon];
        if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
            return Err(FrameError::InvalidLength);
        }
        // canonical form only: "0" or no leading zero
        if digits.len() > 1 && digits[0] == b'0' {
            return Err(FrameError::InvalidLength);
        }
        if digits.len() > self.max_digits {
            return Err(self.too_large_or_invalid(src));
        }

        let length = std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .ok_or(FrameError::InvalidLength)?;
        if length > self.max_length {
            return Err(FrameError::FrameTooLarge {
                length,
                max: self.max_length,
            });
        }

        src.advance(colon + 1);
        Ok(Some(length))
    }

    fn too_large_or_invalid(&self, src: &BytesMut) -> FrameError {
        let digits: Vec<u8> = src.iter().copied().take_while(u8::is_ascii_digit).collect();
        if digits.len() > self.max_digits {
            let length = std::str::from_utf8(&digits)
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(usize::MAX);
            FrameError::FrameTooLarge {
                length,
                max: self.max_length,
            }
        } else {
            FrameError::InvalidLength
        }
    }
}

impl Default for NetstringCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: AsRef<[u8]>> Encoder<T> for NetstringCodec {
    type Error = FrameError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = item.as_ref();
        if payload.len() > self.max_length {
            return Err(FrameError::FrameTooLarge {
                length: payload.len(),
                max: self.max_length,
            });
        }
        let prefix = payload.len().to_string();
        dst.reserve(prefix.len() + payload.len() + 2);
        dst.put_slice(prefix.as_bytes());
        dst.put_u8(b':');
        dst.put_slice(payload);
        dst.put_u8(b',');
        Ok(())
    }
}

impl Decoder for NetstringCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let length = match self.pending {
            Some(length) => length,
            None => match self.decode_length(src)? {
                Some(length) => {
                    self.pending = Some(length);
                    length
                }
                None => return Ok(None),
            },
        };

        if src.len() < length + 1 {
            src.reserve(length + 1 - src.len());
            return Ok(None);
        }
        if src[length] != b',' {
            return Err(FrameError::MissingTerminator);
        }

        let payload = src.split_to(length).freeze();
        src.advance(1);
        self.pending = None;
        Ok(Some(payload))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() && self.pending.is_none() => Ok(None),
            None => Err(FrameError::Truncated(src.len())),
        }
    }
}

/// Decode a frame payload into text; the protocol is UTF-8 throughout.
pub fn payload_to_string(payload: Bytes) -> Result<String, FrameError> {
    String::from_utf8(payload.to_vec()).map_err(|_| FrameError::InvalidUtf8)
}
