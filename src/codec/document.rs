//! # Structured Document Passthrough
//!
//! Self-describing tagged documents carried opaquely inside packet bodies.
//!
//! A single zero byte on the wire is the reserved null marker; any other leading
//! byte is a type tag beginning a document. Decoding charges every consumed byte
//! against an optional byte budget so a hostile peer cannot make the reader
//! allocate unboundedly, and nesting is capped to keep recursion shallow.

use crate::codec::PacketBuffer;
use crate::error::{ProtocolError, Result};

/// Nesting ceiling for lists and maps.
const MAX_DEPTH: usize = 32;

const TAG_END: u8 = 0;
const TAG_BYTE: u8 = 1;
const TAG_SHORT: u8 = 2;
const TAG_INT: u8 = 3;
const TAG_LONG: u8 = 4;
const TAG_FLOAT: u8 = 5;
const TAG_DOUBLE: u8 = 6;
const TAG_BYTES: u8 = 7;
const TAG_TEXT: u8 = 8;
const TAG_LIST: u8 = 9;
const TAG_MAP: u8 = 10;

/// One node of a self-describing document tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Bytes(Vec<u8>),
    Text(String),
    List(Vec<Document>),
    Map(Vec<(String, Document)>),
}

impl Document {
    fn type_tag(&self) -> u8 {
        match self {
            Document::Byte(_) => TAG_BYTE,
            Document::Short(_) => TAG_SHORT,
            Document::Int(_) => TAG_INT,
            Document::Long(_) => TAG_LONG,
            Document::Float(_) => TAG_FLOAT,
            Document::Double(_) => TAG_DOUBLE,
            Document::Bytes(_) => TAG_BYTES,
            Document::Text(_) => TAG_TEXT,
            Document::List(_) => TAG_LIST,
            Document::Map(_) => TAG_MAP,
        }
    }
}

/// Remaining byte allowance while decoding a bounded document.
struct Budget {
    remaining: usize,
    bounded: bool,
}

impl Budget {
    fn bounded(limit: usize) -> Self {
        Self {
            remaining: limit,
            bounded: true,
        }
    }

    fn unbounded() -> Self {
        Self {
            remaining: usize::MAX,
            bounded: false,
        }
    }

    fn charge(&mut self, bytes: usize) -> Result<()> {
        if !self.bounded {
            return Ok(());
        }
        if bytes > self.remaining {
            return Err(ProtocolError::PacketTooBig {
                len: bytes,
                max: self.remaining,
            });
        }
        self.remaining -= bytes;
        Ok(())
    }
}

impl PacketBuffer {
    /// Write a document, or the single-byte null marker for `None`.
    pub fn write_document(&mut self, doc: Option<&Document>) -> Result<()> {
        match doc {
            None => {
                self.write_u8(TAG_END);
                Ok(())
            }
            Some(doc) => {
                self.write_u8(doc.type_tag());
                write_payload(self, doc)
            }
        }
    }

    /// Read a document with an explicit byte budget.
    pub fn read_document_bounded(&mut self, max_bytes: usize) -> Result<Option<Document>> {
        read_root(self, Budget::bounded(max_bytes))
    }

    /// Read a document with no size bound. Only for trusted input.
    pub fn read_document(&mut self) -> Result<Option<Document>> {
        read_root(self, Budget::unbounded())
    }
}

fn write_payload(buf: &mut PacketBuffer, doc: &Document) -> Result<()> {
    match doc {
        Document::Byte(v) => buf.write_i8(*v),
        Document::Short(v) => buf.write_i16(*v),
        Document::Int(v) => buf.write_i32(*v),
        Document::Long(v) => buf.write_i64(*v),
        Document::Float(v) => buf.write_f32(*v),
        Document::Double(v) => buf.write_f64(*v),
        Document::Bytes(v) => buf.write_byte_array(v),
        Document::Text(v) => buf.write_utf(v)?,
        Document::List(items) => {
            buf.write_varint(items.len() as i32);
            for item in items {
                buf.write_u8(item.type_tag());
                write_payload(buf, item)?;
            }
        }
        Document::Map(entries) => {
            for (key, value) in entries {
                buf.write_u8(value.type_tag());
                buf.write_utf(key)?;
                write_payload(buf, value)?;
            }
            buf.write_u8(TAG_END);
        }
    }
    Ok(())
}

fn read_root(buf: &mut PacketBuffer, mut budget: Budget) -> Result<Option<Document>> {
    budget.charge(1)?;
    let tag = buf.read_u8()?;
    if tag == TAG_END {
        return Ok(None);
    }
    Ok(Some(read_payload(buf, tag, &mut budget, 0)?))
}

fn read_payload(
    buf: &mut PacketBuffer,
    tag: u8,
    budget: &mut Budget,
    depth: usize,
) -> Result<Document> {
    if depth > MAX_DEPTH {
        return Err(ProtocolError::InvalidDocument(format!(
            "nesting deeper than {MAX_DEPTH}"
        )));
    }
    match tag {
        TAG_BYTE => {
            budget.charge(1)?;
            Ok(Document::Byte(buf.read_i8()?))
        }
        TAG_SHORT => {
            budget.charge(2)?;
            Ok(Document::Short(buf.read_i16()?))
        }
        TAG_INT => {
            budget.charge(4)?;
            Ok(Document::Int(buf.read_i32()?))
        }
        TAG_LONG => {
            budget.charge(8)?;
            Ok(Document::Long(buf.read_i64()?))
        }
        TAG_FLOAT => {
            budget.charge(4)?;
            Ok(Document::Float(buf.read_f32()?))
        }
        TAG_DOUBLE => {
            budget.charge(8)?;
            Ok(Document::Double(buf.read_f64()?))
        }
        TAG_BYTES => {
            let before = buf.position();
            let bytes = buf.read_byte_array(budget.remaining)?;
            budget.charge(buf.position() - before)?;
            Ok(Document::Bytes(bytes))
        }
        TAG_TEXT => {
            let before = buf.position();
            let text = buf.read_utf()?;
            budget.charge(buf.position() - before)?;
            Ok(Document::Text(text))
        }
        TAG_LIST => {
            let before = buf.position();
            let count = buf.read_varint()?;
            budget.charge(buf.position() - before)?;
            if count < 0 {
                return Err(ProtocolError::NegativeLength(count));
            }
            let mut items = Vec::new();
            for _ in 0..count {
                budget.charge(1)?;
                let item_tag = buf.read_u8()?;
                if item_tag == TAG_END {
                    return Err(ProtocolError::InvalidDocument(
                        "end marker inside list".to_string(),
                    ));
                }
                items.push(read_payload(buf, item_tag, budget, depth + 1)?);
            }
            Ok(Document::List(items))
        }
        TAG_MAP => {
            let mut entries = Vec::new();
            loop {
                budget.charge(1)?;
                let value_tag = buf.read_u8()?;
                if value_tag == TAG_END {
                    return Ok(Document::Map(entries));
                }
                let before = buf.position();
                let key = buf.read_utf()?;
                budget.charge(buf.position() - before)?;
                let value = read_payload(buf, value_tag, budget, depth + 1)?;
                entries.push((key, value));
            }
        }
        other => Err(ProtocolError::InvalidDocument(format!(
            "unknown type tag {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        Document::Map(vec![
            ("name".to_string(), Document::Text("stone".to_string())),
            ("count".to_string(), Document::Int(64)),
            (
                "tags".to_string(),
                Document::List(vec![Document::Byte(1), Document::Byte(2)]),
            ),
            ("raw".to_string(), Document::Bytes(vec![9, 8, 7])),
        ])
    }

    #[test]
    fn null_marker_is_single_zero_byte() {
        let mut buf = PacketBuffer::new();
        buf.write_document(None).unwrap();
        assert_eq!(buf.as_slice(), &[0]);
        assert_eq!(buf.read_document().unwrap(), None);
    }

    #[test]
    fn document_roundtrip() {
        let doc = sample();
        let mut buf = PacketBuffer::new();
        buf.write_document(Some(&doc)).unwrap();
        assert_eq!(buf.read_document().unwrap(), Some(doc));
    }

    #[test]
    fn bounded_read_accepts_within_budget() {
        let doc = sample();
        let mut buf = PacketBuffer::new();
        buf.write_document(Some(&doc)).unwrap();
        let len = buf.len();
        assert_eq!(buf.read_document_bounded(len).unwrap(), Some(doc));
    }

    #[test]
    fn bounded_read_rejects_over_budget() {
        let mut buf = PacketBuffer::new();
        buf.write_document(Some(&Document::Bytes(vec![0; 256])))
            .unwrap();
        assert!(matches!(
            buf.read_document_bounded(16),
            Err(ProtocolError::PacketTooBig { .. })
        ));
    }

    #[test]
    fn unknown_tag_rejected() {
        let mut buf = PacketBuffer::from_bytes(vec![99]);
        assert!(matches!(
            buf.read_document(),
            Err(ProtocolError::InvalidDocument(_))
        ));
    }

    #[test]
    fn runaway_nesting_rejected() {
        // A list-of-list chain deeper than the cap.
        let mut bytes = vec![TAG_LIST];
        for _ in 0..40 {
            bytes.push(1); // count
            bytes.push(TAG_LIST);
        }
        bytes.push(0); // innermost count
        let mut buf = PacketBuffer::from_bytes(bytes);
        assert!(matches!(
            buf.read_document(),
            Err(ProtocolError::InvalidDocument(_))
        ));
    }
}
