#![cfg_attr(not(feature = "std"), no_std)]

//! Framing and deframing for raw byte streams, like serial links.
//!
//! Frames look like `SOM_1 SOM_2 | command u16 | length u32 | payload |
//! crc u16`, all big-endian, with a CRC-16-CCITT over everything but the
//! start-of-message pair. The receive side is a push parser: feed it bytes
//! in whatever chunks the transport hands you, and it calls back with
//! complete frames or framing errors.

#[cfg(feature = "alloc")]
extern crate alloc;

pub mod crc;

pub mod parse;
pub use parse::{DecodeError, Depacketizer, FrameHandler};

pub mod serialize;
pub use serialize::{write_frame, FrameSink, IoSink};

/// First start-of-message byte.
pub const SOM_1: u8 = 0x55;
/// Second start-of-message byte.
pub const SOM_2: u8 = 0xAA;
