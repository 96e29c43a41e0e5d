//! The receive-side framing state machine.

use crate::crc::Crc16;
use crate::{SOM_1, SOM_2};

/// Position in the frame grammar. Traversed strictly in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum RxState {
    Som1,
    Som2,
    CmdHigh,
    CmdLow,
    Len0,
    Len1,
    Len2,
    Len3,
    Payload,
    CrcHigh,
    CrcLow,
}

/// Errors reported through [FrameHandler::on_error].
///
/// All of these are recoverable: the depacketizer resynchronizes after
/// every one of them and keeps parsing the same input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    /// First start-of-message byte did not match.
    BadSom1,
    /// Second start-of-message byte did not match.
    BadSom2,
    /// Declared payload length exceeds the receive buffer.
    LengthTooLarge,
    /// A payload write would run past the receive buffer.
    Overrun,
    /// Received checksum did not match the computed one.
    Checksum,
    /// No receive buffer has been assigned.
    BufferUnset,
}

#[cfg(feature = "std")]
impl std::error::Error for DecodeError {}

impl core::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            Self::BadSom1 => write!(f, "bad first start-of-message byte"),
            Self::BadSom2 => write!(f, "bad second start-of-message byte"),
            Self::LengthTooLarge => write!(f, "declared length too large for receive buffer"),
            Self::Overrun => write!(f, "receive buffer overrun"),
            Self::Checksum => write!(f, "checksum mismatch"),
            Self::BufferUnset => write!(f, "no receive buffer assigned"),
        }
    }
}

/// Callbacks driven by a [Depacketizer].
///
/// This replaces subclassing: implement [FrameHandler::on_frame] for the
/// frames you care about, and override [FrameHandler::on_error] only if you
/// want to observe framing errors. The default error handler does nothing.
pub trait FrameHandler {
    /// A complete frame arrived and its checksum checked out.
    fn on_frame(&mut self, command: u16, payload: &[u8]);

    /// A framing error occurred.
    ///
    /// Everything after `error` is diagnostic context on a best-effort
    /// basis only: the accumulated command, the payload bytes received so
    /// far, the declared payload length, and the raw start-of-message pair
    /// as observed on the wire. Not every field is meaningful for every
    /// error kind.
    fn on_error(&mut self, error: DecodeError, command: u16, received: &[u8], length: usize, som: u16) {
        let _ = (error, command, received, length, som);
    }
}

impl<H> FrameHandler for &mut H
where
    H: FrameHandler,
{
    fn on_frame(&mut self, command: u16, payload: &[u8]) {
        (*self).on_frame(command, payload)
    }

    fn on_error(&mut self, error: DecodeError, command: u16, received: &[u8], length: usize, som: u16) {
        (*self).on_error(error, command, received, length, som)
    }
}

/// Incremental frame parser over a caller-supplied receive buffer.
///
/// Feed it bytes as they arrive, in any chunking; it tracks partial frames
/// across calls and invokes the handler for each decoded frame or framing
/// error. The buffer is borrowed, never grown, and never written past its
/// length. One frame is in flight at a time.
pub struct Depacketizer<'b, H> {
    handler: H,
    buf: Option<&'b mut [u8]>,
    state: RxState,
    command: u16,
    length: usize,
    index: usize,
    crc: Crc16,
    rx_crc: u16,
    rx_som: u16,
}

impl<'b, H> Depacketizer<'b, H>
where
    H: FrameHandler,
{
    /// Create a depacketizer around a receive buffer.
    ///
    /// The buffer's length is the largest payload this depacketizer will
    /// accept; longer declared lengths are rejected as
    /// [DecodeError::LengthTooLarge].
    pub fn new(handler: H, buf: &'b mut [u8]) -> Self {
        Self {
            handler,
            buf: Some(buf),
            state: RxState::Som1,
            command: 0,
            length: 0,
            index: 0,
            crc: Crc16::new(),
            rx_crc: 0,
            rx_som: 0,
        }
    }

    /// Create a depacketizer with no receive buffer yet.
    ///
    /// Feeding it before [Depacketizer::set_buffer] reports
    /// [DecodeError::BufferUnset] and consumes nothing.
    pub fn without_buffer(handler: H) -> Self {
        Self {
            handler,
            buf: None,
            state: RxState::Som1,
            command: 0,
            length: 0,
            index: 0,
            crc: Crc16::new(),
            rx_crc: 0,
            rx_som: 0,
        }
    }

    /// Assign or swap the receive buffer.
    ///
    /// Only swap while [Depacketizer::is_idle] holds; a swap mid-frame
    /// abandons the payload bytes accumulated so far.
    pub fn set_buffer(&mut self, buf: &'b mut [u8]) {
        self.buf = Some(buf);
    }

    /// True when the parser is between frames, waiting for start-of-message.
    ///
    /// This is the safe point to call [Depacketizer::set_buffer].
    pub fn is_idle(&self) -> bool {
        self.state == RxState::Som1
    }

    /// Abandon any partial frame and return to the idle state.
    ///
    /// Clears the accumulated command, length, and checksums, and re-seeds
    /// the running CRC. Safe to call at any point, including mid-frame.
    pub fn reset(&mut self) {
        self.state = RxState::Som1;
        self.command = 0;
        self.length = 0;
        self.index = 0;
        self.rx_crc = 0;
        self.crc.reset();
    }

    /// Shared reference to the injected handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Mutable reference to the injected handler.
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Tear down the parser and keep the handler.
    pub fn into_handler(self) -> H {
        self.handler
    }

    /// Feed received bytes to the parser.
    ///
    /// Bytes may arrive one at a time or many frames at once; any chunking
    /// of the same stream produces the same sequence of frames and errors.
    /// Errors never stop the scan, the rest of `data` is still processed.
    pub fn feed(&mut self, data: &[u8]) {
        if self.buf.is_none() {
            self.emit_error(DecodeError::BufferUnset);
            return;
        }

        let mut i = 0;
        while i < data.len() {
            let byte = data[i];

            match self.state {
                RxState::Som1 => {
                    self.rx_som = (byte as u16) << 8;
                    if byte == SOM_1 {
                        self.state = RxState::Som2;
                    } else {
                        self.emit_error(DecodeError::BadSom1);
                    }
                }

                RxState::Som2 => {
                    self.rx_som |= byte as u16;
                    if byte == SOM_2 {
                        // drop anything accumulated and re-seed the crc
                        self.reset();
                        self.state = RxState::CmdHigh;
                    } else {
                        // back to scanning; the rejected byte is consumed
                        self.state = RxState::Som1;
                        self.emit_error(DecodeError::BadSom2);
                    }
                }

                RxState::CmdHigh => {
                    self.command = (byte as u16) << 8;
                    self.crc.update(&[byte]);
                    self.state = RxState::CmdLow;
                }

                RxState::CmdLow => {
                    self.command |= byte as u16;
                    self.crc.update(&[byte]);
                    self.state = RxState::Len0;
                }

                RxState::Len0 => {
                    self.length = (byte as usize) << 24;
                    self.crc.update(&[byte]);
                    self.state = RxState::Len1;
                }

                RxState::Len1 => {
                    self.length |= (byte as usize) << 16;
                    self.crc.update(&[byte]);
                    self.state = RxState::Len2;
                }

                RxState::Len2 => {
                    self.length |= (byte as usize) << 8;
                    self.crc.update(&[byte]);
                    self.state = RxState::Len3;
                }

                RxState::Len3 => {
                    self.length |= byte as usize;
                    self.crc.update(&[byte]);
                    self.index = 0;

                    if self.length > self.capacity() {
                        // resynchronize by marker scanning, nothing written
                        self.emit_error(DecodeError::LengthTooLarge);
                        self.state = RxState::Som1;
                    } else if self.length == 0 {
                        self.state = RxState::CrcHigh;
                    } else if data.len() - i - 1 >= self.length {
                        // the whole payload is already in this chunk, take
                        // it as one block instead of one byte per loop turn
                        let block = &data[i + 1..i + 1 + self.length];
                        if let Some(buf) = self.buf.as_mut() {
                            buf[..block.len()].copy_from_slice(block);
                        }
                        self.crc.update(block);
                        self.index = self.length;
                        i += self.length;
                        self.state = RxState::CrcHigh;
                    } else {
                        self.state = RxState::Payload;
                    }
                }

                RxState::Payload => {
                    // length <= capacity was checked at Len3; this guards
                    // against a buffer swapped out from under a frame
                    if self.index >= self.capacity() {
                        self.emit_error(DecodeError::Overrun);
                        self.state = RxState::Som1;
                    } else {
                        if let Some(buf) = self.buf.as_mut() {
                            buf[self.index] = byte;
                        }
                        self.crc.update(&[byte]);
                        self.index += 1;
                        if self.index >= self.length {
                            self.state = RxState::CrcHigh;
                        }
                    }
                }

                RxState::CrcHigh => {
                    self.rx_crc = (byte as u16) << 8;
                    self.state = RxState::CrcLow;
                }

                RxState::CrcLow => {
                    self.rx_crc |= byte as u16;
                    if self.rx_crc == self.crc.value() {
                        self.dispatch();
                    } else {
                        self.emit_error(DecodeError::Checksum);
                    }
                    self.reset();
                }
            }

            i += 1;
        }
    }

    fn capacity(&self) -> usize {
        self.buf.as_deref().map_or(0, <[u8]>::len)
    }

    fn dispatch(&mut self) {
        let payload = match self.buf.as_deref() {
            Some(buf) => &buf[..self.length.min(buf.len())],
            None => &[][..],
        };
        self.handler.on_frame(self.command, payload);
    }

    fn emit_error(&mut self, error: DecodeError) {
        let received = match self.buf.as_deref() {
            Some(buf) => &buf[..self.index.min(buf.len())],
            None => &[][..],
        };
        self.handler
            .on_error(error, self.command, received, self.length, self.rx_som);
    }
}
