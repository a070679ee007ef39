//! Framed command channel to the interface firmware.
//!
//! Request:  `opcode:u8, argc:u8, args[argc]`
//! Response: `opcode:u8, length:u8, payload[length]`

use crate::transport::Transport;
use crate::{Error, Result};
use std::fmt;
use strum::{FromRepr, IntoStaticStr};

/// Firmware opcodes. Values are fixed by the interface sketch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, IntoStaticStr)]
#[repr(u8)]
pub enum Opcode {
    /// Initialise the interface IO and reset the flash.
    Init = 0x00,
    /// No arguments, answers `[manufacturer_id, device_id]`.
    Identify = 0x01,
    /// `[addr; 4] ++ [len]`, answers `len` data bytes.
    Read = 0x02,
    /// `[addr; 4]`, answers an empty acknowledgement.
    EraseSector = 0x03,
    /// `[addr; 4] ++ [len] ++ data`, answers an empty acknowledgement.
    Write = 0x04,
    /// `[addr; 4]`, answers one status byte.
    QueryProtection = 0x05,
}

impl Opcode {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name: &'static str = self.into();
        write!(f, "{}(0x{:02X})", name, self.code())
    }
}

/// Encode a flash address the way every address-carrying command expects it.
pub fn encode_address(address: u32) -> [u8; 4] {
    address.to_be_bytes()
}

pub fn decode_address(bytes: [u8; 4]) -> u32 {
    u32::from_be_bytes(bytes)
}

/// Arguments of a read or write request header: address followed by length.
pub fn chunk_args(address: u32, len: u8) -> [u8; 5] {
    let [a0, a1, a2, a3] = encode_address(address);
    [a0, a1, a2, a3, len]
}

/// Command execution interface shared by every engine.
pub trait FlashCommand {
    fn execute(&mut self, opcode: Opcode, args: &[u8]) -> Result<Vec<u8>>;
}

/// [`FlashCommand`] implementation that owns the transport for a session.
pub struct CommandChannel<T: Transport> {
    transport: T,
}

impl<T: Transport> CommandChannel<T> {
    pub const MAX_ARGS: usize = u8::MAX as usize;

    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn into_inner(self) -> T {
        self.transport
    }
}

impl<T: Transport> FlashCommand for CommandChannel<T> {
    fn execute(&mut self, opcode: Opcode, args: &[u8]) -> Result<Vec<u8>> {
        if args.len() > Self::MAX_ARGS {
            return Err(Error::TooManyArguments(args.len()));
        }

        let mut frame = Vec::with_capacity(args.len() + 2);
        frame.push(opcode.code());
        frame.push(args.len() as u8);
        frame.extend_from_slice(args);

        tracing::trace!("command: {} with {} argument bytes", opcode, args.len());
        self.transport.write_all(&frame)?;

        let mut header = [0u8; 2];
        self.transport.read_exact(&mut header)?;
        let [received, length] = header;

        // The device is not resynchronised here: whatever payload follows a
        // bad header stays in the transport.
        if received != opcode.code() {
            tracing::debug!(
                "framing mismatch: sent {}, received header {:02X?}",
                opcode,
                header
            );
            return Err(Error::FramingMismatch {
                sent: opcode,
                received,
            });
        }

        let mut payload = vec![0u8; length as usize];
        self.transport.read_exact(&mut payload)?;
        tracing::trace!("response: {} with {} payload bytes", opcode, payload.len());

        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Replays canned response bytes and records everything written.
    struct Scripted {
        written: Vec<u8>,
        replies: VecDeque<u8>,
    }

    impl Scripted {
        fn new(replies: &[u8]) -> Self {
            Self {
                written: Vec::new(),
                replies: replies.iter().copied().collect(),
            }
        }
    }

    impl Transport for Scripted {
        fn write_all(&mut self, data: &[u8]) -> Result<()> {
            self.written.extend_from_slice(data);
            Ok(())
        }

        fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
            for slot in buf.iter_mut() {
                *slot = self.replies.pop_front().ok_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "script exhausted")
                })?;
            }
            Ok(())
        }
    }

    #[test]
    fn frames_request_and_returns_payload() {
        let mut channel = CommandChannel::new(Scripted::new(&[0x02, 0x03, 0xAA, 0xBB, 0xCC]));
        let payload = channel
            .execute(Opcode::Read, &chunk_args(0x0001_2345, 3))
            .unwrap();

        assert_eq!(payload, vec![0xAA, 0xBB, 0xCC]);
        assert_eq!(
            channel.into_inner().written,
            vec![0x02, 0x05, 0x00, 0x01, 0x23, 0x45, 0x03]
        );
    }

    #[test]
    fn mismatched_opcode_yields_no_payload() {
        let mut channel = CommandChannel::new(Scripted::new(&[0x03, 0x02, 0x11, 0x22]));
        let err = channel.execute(Opcode::Identify, &[]).unwrap_err();

        assert!(matches!(
            err,
            Error::FramingMismatch {
                sent: Opcode::Identify,
                received: 0x03
            }
        ));
        assert!(err.is_channel_error());
        // payload bytes were left unread
        assert_eq!(channel.into_inner().replies.len(), 2);
    }

    #[test]
    fn rejects_oversized_argument_list_before_writing() {
        let mut channel = CommandChannel::new(Scripted::new(&[]));
        let args = vec![0u8; 256];
        let err = channel.execute(Opcode::Write, &args).unwrap_err();

        assert!(matches!(err, Error::TooManyArguments(256)));
        assert!(channel.into_inner().written.is_empty());
    }

    #[test]
    fn largest_argument_list_is_framed() {
        let mut channel = CommandChannel::new(Scripted::new(&[0x04, 0x00]));
        let args = vec![0x5Au8; 255];
        channel.execute(Opcode::Write, &args).unwrap();

        let written = channel.into_inner().written;
        assert_eq!(written.len(), 257);
        assert_eq!(&written[..2], &[0x04, 0xFF]);
    }

    #[test]
    fn empty_acknowledgement() {
        let mut channel = CommandChannel::new(Scripted::new(&[0x03, 0x00]));
        let payload = channel
            .execute(Opcode::EraseSector, &encode_address(0x7C000))
            .unwrap();
        assert!(payload.is_empty());
    }

    #[test]
    fn addresses_are_big_endian() {
        assert_eq!(encode_address(0x0007_A000), [0x00, 0x07, 0xA0, 0x00]);
        assert_eq!(decode_address([0x00, 0x07, 0xA0, 0x00]), 0x0007_A000);
    }

    #[test]
    fn opcode_values_and_display() {
        assert_eq!(Opcode::from_repr(0x05), Some(Opcode::QueryProtection));
        assert_eq!(Opcode::from_repr(0x06), None);
        assert_eq!(Opcode::Read.to_string(), "Read(0x02)");
    }
}
