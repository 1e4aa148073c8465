//! Bytecode Serialization
//!
//! Streams a prototype tree to a sink as successive byte chunks: the header
//! first, then one chunk per prototype. The sink may abort by returning
//! `false`.

use super::proto::{Constant, Proto};
use super::{
    BYTECODE_MAGIC, TAG_BOOL, TAG_INTEGER, TAG_NIL, TAG_NUMBER, TAG_STRING, VERSION_MAJOR,
    VERSION_MINOR, VERSION_PATCH,
};
use crate::error::{EmberError, EmberResult};

struct Dumper<W> {
    sink: W,
    buf: Vec<u8>,
}

impl<W: FnMut(&[u8]) -> bool> Dumper<W> {
    fn flush(&mut self) -> EmberResult<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let accepted = (self.sink)(&self.buf);
        self.buf.clear();
        if accepted {
            Ok(())
        } else {
            Err(EmberError::Io("bytecode writer rejected a chunk".to_string()))
        }
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn len(&mut self, len: usize) -> EmberResult<()> {
        let len = u32::try_from(len)
            .map_err(|_| EmberError::MalformedBytecode("section exceeds 4 GiB".to_string()))?;
        self.u32(len);
        Ok(())
    }

    fn bytes(&mut self, bytes: &[u8]) -> EmberResult<()> {
        self.len(bytes.len())?;
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    fn header(&mut self) -> EmberResult<()> {
        self.u32(BYTECODE_MAGIC);
        self.u8(VERSION_MAJOR);
        self.u8(VERSION_MINOR);
        self.u8(VERSION_PATCH);
        self.u8(0);
        self.flush()
    }

    fn proto(&mut self, proto: &Proto) -> EmberResult<()> {
        self.bytes(proto.name.as_bytes())?;
        self.u32(proto.line_defined);
        self.u8(proto.num_params);
        self.u8(proto.max_locals);

        self.len(proto.constants.len())?;
        for constant in &proto.constants {
            match constant {
                Constant::Nil => self.u8(TAG_NIL),
                Constant::Bool(b) => {
                    self.u8(TAG_BOOL);
                    self.u8(*b as u8);
                }
                Constant::Number(n) => {
                    self.u8(TAG_NUMBER);
                    self.buf.extend_from_slice(&n.to_be_bytes());
                }
                Constant::Integer(i) => {
                    self.u8(TAG_INTEGER);
                    self.buf.extend_from_slice(&i.to_be_bytes());
                }
                Constant::Str(s) => {
                    self.u8(TAG_STRING);
                    self.bytes(s.as_bytes())?;
                }
            }
        }

        self.bytes(&proto.code)?;

        self.len(proto.lines.len())?;
        for info in &proto.lines {
            self.u32(info.offset);
            self.u32(info.line);
        }

        self.len(proto.protos.len())?;
        self.flush()?;

        for child in &proto.protos {
            self.proto(child)?;
        }
        Ok(())
    }
}

/// Serialize `proto` into `sink`, chunk by chunk
pub fn dump<W>(proto: &Proto, sink: W) -> EmberResult<()>
where
    W: FnMut(&[u8]) -> bool,
{
    let mut dumper = Dumper {
        sink,
        buf: Vec::new(),
    };
    dumper.header()?;
    dumper.proto(proto)
}

/// Serialize `proto` into a byte vector
pub fn to_bytes(proto: &Proto) -> Vec<u8> {
    let mut out = Vec::new();
    // The sink never rejects and section lengths come from in-memory vectors.
    let _ = dump(proto, |chunk| {
        out.extend_from_slice(chunk);
        true
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::is_bytecode;

    #[test]
    fn header_is_emitted_as_its_own_chunk() {
        let mut chunks: Vec<Vec<u8>> = Vec::new();
        dump(&Proto::default(), |chunk| {
            chunks.push(chunk.to_vec());
            true
        })
        .unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 8);
        assert!(is_bytecode(&chunks[0]));
    }

    #[test]
    fn rejecting_sink_aborts_the_dump() {
        let mut calls = 0;
        let res = dump(&Proto::default(), |_| {
            calls += 1;
            false
        });
        assert!(res.is_err());
        assert_eq!(calls, 1);
    }
}
