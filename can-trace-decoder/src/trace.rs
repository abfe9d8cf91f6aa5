//! Trace file iterator
//!
//! Reads fixed 16-byte frame records from one stream and yields a stream-begin
//! message, one event per record, then a stream-end message:
//!
//! ```text
//! Init -> Events -> End -> Exhausted
//! ```
//!
//! The input stream is owned by the `Init`/`Events` states, so it is released as
//! soon as the iterator leaves them or is dropped.

use crate::frame_decoder::FrameDecoder;
use crate::schema::SchemaRegistry;
use crate::types::{DecoderError, FrameRecord, Result, TraceMessage, RECORD_SIZE};
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

enum State<R> {
    Init(R),
    Events(R),
    End,
    Exhausted,
}

/// Iterator over the messages of one trace stream
pub struct TraceIterator<'r, R: Read> {
    registry: &'r SchemaRegistry,
    state: State<R>,
    /// Byte offset of the next record
    offset: u64,
}

impl<'r> TraceIterator<'r, BufReader<File>> {
    /// Open a trace file for decoding
    pub fn open(registry: &'r SchemaRegistry, path: &Path) -> Result<Self> {
        log::info!("Opening trace file: {:?}", path);
        let file = File::open(path)?;
        Ok(Self::new(registry, BufReader::new(file)))
    }
}

impl<'r, R: Read> TraceIterator<'r, R> {
    /// Decode records from any byte stream
    pub fn new(registry: &'r SchemaRegistry, reader: R) -> Self {
        Self {
            registry,
            state: State::Init(reader),
            offset: 0,
        }
    }

    /// True once the iterator has produced its last message
    pub fn is_exhausted(&self) -> bool {
        matches!(self.state, State::Exhausted)
    }

    fn step(&mut self) -> Option<Result<TraceMessage<'r>>> {
        match std::mem::replace(&mut self.state, State::Exhausted) {
            State::Init(reader) => {
                self.state = State::Events(reader);
                Some(Ok(TraceMessage::StreamBeginning))
            }
            State::Events(mut reader) => {
                let mut buf = [0u8; RECORD_SIZE];
                match read_record(&mut reader, &mut buf) {
                    Ok(0) => {
                        log::debug!("End of trace after {} bytes", self.offset);
                        self.state = State::End;
                        self.step()
                    }
                    Ok(RECORD_SIZE) => {
                        let record = FrameRecord::parse(&buf);
                        self.offset += RECORD_SIZE as u64;
                        match FrameDecoder::decode(self.registry, &record) {
                            Ok(event) => {
                                self.state = State::Events(reader);
                                Some(Ok(TraceMessage::Event(event)))
                            }
                            Err(e) => Some(Err(e)),
                        }
                    }
                    Ok(len) => Some(Err(DecoderError::Truncated {
                        offset: self.offset,
                        len,
                    })),
                    Err(e) => Some(Err(e.into())),
                }
            }
            State::End => Some(Ok(TraceMessage::StreamEnd)),
            State::Exhausted => None,
        }
    }
}

impl<'r, R: Read> Iterator for TraceIterator<'r, R> {
    type Item = Result<TraceMessage<'r>>;

    /// Errors are terminal: the iterator is exhausted after yielding one.
    fn next(&mut self) -> Option<Self::Item> {
        self.step()
    }
}

/// Fill `buf` from the reader, stopping early only at end of stream.
/// Returns the number of bytes read.
fn read_record<R: Read>(reader: &mut R, buf: &mut [u8; RECORD_SIZE]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < RECORD_SIZE {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
