//! Frame building and the transport sink seam.

use crate::crc::Crc16;
use crate::{SOM_1, SOM_2};

/// Re-export to allow driving [IoSink] from [std::io] streams.
#[cfg(feature = "std")]
pub use embedded_io_adapters::std::FromStd;

/// Where encoded frame bytes go.
///
/// This replaces subclassing on the transmit side: point it at a serial
/// port, a queue, whatever the transport is. Writes are best-effort, the
/// encoder does not inspect the returned count; surfacing short writes is
/// the sink's job. [FrameSink::lock] and [FrameSink::unlock] bracket each
/// frame so multiple producers sharing one sink have somewhere to hang a
/// mutex; both default to doing nothing.
pub trait FrameSink {
    /// Write bytes to the transport, returning how many were accepted.
    fn write(&mut self, bytes: &[u8]) -> usize;

    /// Called before the first write of a frame.
    fn lock(&mut self) {}

    /// Called after the last write of a frame.
    fn unlock(&mut self) {}
}

impl<S> FrameSink for &mut S
where
    S: FrameSink,
{
    fn write(&mut self, bytes: &[u8]) -> usize {
        (*self).write(bytes)
    }

    fn lock(&mut self) {
        (*self).lock()
    }

    fn unlock(&mut self) {
        (*self).unlock()
    }
}

#[cfg(feature = "alloc")]
impl FrameSink for alloc::vec::Vec<u8> {
    fn write(&mut self, bytes: &[u8]) -> usize {
        self.extend_from_slice(bytes);
        bytes.len()
    }
}

/// Build one frame around `payload` and hand it to `sink`.
///
/// Emits the start-of-message pair, command, length, payload, and CRC, in
/// that order. The CRC covers the command, length, and payload, never the
/// start-of-message pair, matching what [crate::Depacketizer] verifies.
pub fn write_frame<S>(sink: &mut S, command: u16, payload: &[u8])
where
    S: FrameSink,
{
    let mut header = [0u8; 8];
    header[0] = SOM_1;
    header[1] = SOM_2;
    header[2..4].copy_from_slice(&command.to_be_bytes());
    header[4..8].copy_from_slice(&(payload.len() as u32).to_be_bytes());

    let mut crc = Crc16::new();
    crc.update(&header[2..]);

    sink.lock();
    sink.write(&header);

    crc.update(payload);
    if !payload.is_empty() {
        sink.write(payload);
    }

    sink.write(&crc.value().to_be_bytes());
    sink.unlock();
}

/// Adapts an [embedded_io::Write] into a [FrameSink].
///
/// [write_frame] is infallible by contract, so write errors are held here
/// instead; check [IoSink::error] after encoding if the transport can fail.
#[derive(Debug)]
pub struct IoSink<W>
where
    W: embedded_io::Write,
{
    inner: W,
    error: Option<W::Error>,
}

impl<W> IoSink<W>
where
    W: embedded_io::Write,
{
    pub fn new(inner: W) -> Self {
        Self { inner, error: None }
    }

    /// The first write error seen, if any.
    pub fn error(&self) -> Option<&W::Error> {
        self.error.as_ref()
    }

    /// Take and clear the held error.
    pub fn take_error(&mut self) -> Option<W::Error> {
        self.error.take()
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W> FrameSink for IoSink<W>
where
    W: embedded_io::Write,
{
    fn write(&mut self, bytes: &[u8]) -> usize {
        match self.inner.write(bytes) {
            Ok(n) => n,
            Err(e) => {
                if self.error.is_none() {
                    self.error = Some(e);
                }
                0
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crc;

    #[derive(Debug, Default, PartialEq, Eq)]
    struct Recording {
        events: Vec<Event>,
    }

    #[derive(Debug, PartialEq, Eq)]
    enum Event {
        Lock,
        Write(Vec<u8>),
        Unlock,
    }

    impl FrameSink for Recording {
        fn write(&mut self, bytes: &[u8]) -> usize {
            self.events.push(Event::Write(bytes.to_vec()));
            bytes.len()
        }

        fn lock(&mut self) {
            self.events.push(Event::Lock);
        }

        fn unlock(&mut self) {
            self.events.push(Event::Unlock);
        }
    }

    #[test]
    fn known_frame_bytes() {
        let mut out = Vec::new();
        write_frame(&mut out, 0x0001, &[0xbe, 0xef, 0xca, 0xfe]);

        let body = [0x00, 0x01, 0x00, 0x00, 0x00, 0x04, 0xbe, 0xef, 0xca, 0xfe];
        let mut expected = vec![0x55, 0xaa];
        expected.extend_from_slice(&body);
        expected.extend_from_slice(&crc::update(crc::SEED, &body).to_be_bytes());

        assert_eq!(out, expected);
    }

    #[test]
    fn lock_brackets_every_frame() {
        let mut sink = Recording::default();
        write_frame(&mut sink, 7, b"abc");

        assert_eq!(sink.events.first(), Some(&Event::Lock));
        assert_eq!(sink.events.last(), Some(&Event::Unlock));
        // header, payload, crc
        let writes = sink
            .events
            .iter()
            .filter(|e| matches!(e, Event::Write(_)))
            .count();
        assert_eq!(writes, 3);
    }

    #[test]
    fn empty_payload_skips_payload_write() {
        let mut sink = Recording::default();
        write_frame(&mut sink, 7, &[]);

        assert_eq!(
            sink.events,
            vec![
                Event::Lock,
                Event::Write(vec![0x55, 0xaa, 0x00, 0x07, 0x00, 0x00, 0x00, 0x00]),
                Event::Write(
                    crc::update(crc::SEED, &[0x00, 0x07, 0x00, 0x00, 0x00, 0x00])
                        .to_be_bytes()
                        .to_vec()
                ),
                Event::Unlock,
            ]
        );
    }

    #[test]
    fn io_sink_passes_bytes_through() {
        let mut direct = Vec::new();
        write_frame(&mut direct, 3, b"xyz");

        let mut sink = IoSink::new(Vec::new());
        write_frame(&mut sink, 3, b"xyz");

        assert!(sink.error().is_none());
        assert_eq!(sink.into_inner(), direct);
    }

    #[test]
    fn io_sink_holds_first_error() {
        struct Broken;

        impl embedded_io::ErrorType for Broken {
            type Error = embedded_io::ErrorKind;
        }

        impl embedded_io::Write for Broken {
            fn write(&mut self, _bytes: &[u8]) -> Result<usize, Self::Error> {
                Err(embedded_io::ErrorKind::Other)
            }

            fn flush(&mut self) -> Result<(), Self::Error> {
                Ok(())
            }
        }

        let mut sink = IoSink::new(Broken);
        write_frame(&mut sink, 1, &[2]);
        assert_eq!(sink.take_error(), Some(embedded_io::ErrorKind::Other));
        assert!(sink.error().is_none());
    }
}
