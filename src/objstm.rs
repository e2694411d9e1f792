//! Compressed object streams (`/Type /ObjStm`).
//!
//! Object streams (PDF 1.5+) pack many small objects into one compressed
//! stream. The decoded payload starts with `/N` pairs of
//! `object_number offset` integers; `/First` gives the byte offset of the
//! first object body.

use crate::error::{Error, Result};
use crate::object::Object;
use crate::parser::parse_object;

/// A decoded object stream ready for member lookup.
#[derive(Debug, Clone)]
pub struct ObjectStream {
    /// Decoded payload
    data: Vec<u8>,
    /// (object_number, offset relative to `first`) pairs in stream order
    members: Vec<(u32, usize)>,
    /// Offset of the first object body within `data`
    first: usize,
}

impl ObjectStream {
    /// Decode and index an object stream.
    pub fn parse(stream: &Object) -> Result<Self> {
        let dict = stream
            .as_dict()
            .ok_or_else(|| Error::InvalidPdf("object stream is not a stream".to_string()))?;

        if dict.get("Type").and_then(|o| o.as_name()) != Some("ObjStm") {
            return Err(Error::InvalidPdf("expected /Type /ObjStm".to_string()));
        }

        let n = dict
            .get("N")
            .and_then(|o| o.as_integer())
            .ok_or_else(|| Error::InvalidPdf("object stream missing /N".to_string()))?
            as usize;
        let first = dict
            .get("First")
            .and_then(|o| o.as_integer())
            .ok_or_else(|| Error::InvalidPdf("object stream missing /First".to_string()))?
            as usize;

        let data = stream.decode_stream_data()?;
        if first > data.len() {
            return Err(Error::InvalidPdf("/First beyond object stream data".to_string()));
        }

        // Header: N pairs of integers
        let mut members = Vec::with_capacity(n);
        let mut input = &data[..first];
        for _ in 0..n {
            let (rest, num) = parse_object(input)
                .map_err(|_| Error::InvalidPdf("bad object stream header".to_string()))?;
            let (rest, off) = parse_object(rest)
                .map_err(|_| Error::InvalidPdf("bad object stream header".to_string()))?;
            let num = num
                .as_integer()
                .ok_or_else(|| Error::InvalidPdf("bad object stream header".to_string()))?;
            let off = off
                .as_integer()
                .ok_or_else(|| Error::InvalidPdf("bad object stream header".to_string()))?;
            members.push((num as u32, off as usize));
            input = rest;
        }

        Ok(Self {
            data,
            members,
            first,
        })
    }

    /// Number of member objects.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the stream has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Extract the member at `index`, verifying its object number when the
    /// caller knows it.
    pub fn member_at(&self, index: usize, expect_num: Option<u32>) -> Result<Object> {
        let &(num, offset) = self
            .members
            .get(index)
            .ok_or_else(|| Error::InvalidPdf(format!("object stream index {} out of range", index)))?;

        if let Some(expected) = expect_num {
            if expected != num {
                log::warn!(
                    "object stream member {} has number {}, expected {}",
                    index,
                    num,
                    expected
                );
            }
        }

        let start = self.first + offset;
        let body = self
            .data
            .get(start..)
            .ok_or_else(|| Error::InvalidPdf("object stream member offset out of range".to_string()))?;
        let (_, obj) = parse_object(body).map_err(|_| Error::ParseError {
            offset: start,
            reason: format!("object stream member {} unparsable", num),
        })?;
        Ok(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Dict;

    fn sample_stream() -> Object {
        // Two members: 7 -> <</A 1>>, 8 -> [1 2]
        let payload = b"7 0 8 11 << /A 1 >> [ 1 2 ]".to_vec();
        let mut dict = Dict::new();
        dict.insert("Type".to_string(), Object::Name("ObjStm".to_string()));
        dict.insert("N".to_string(), Object::Integer(2));
        dict.insert("First".to_string(), Object::Integer(9));
        dict.insert("Length".to_string(), Object::Integer(payload.len() as i64));
        Object::Stream {
            dict,
            data: bytes::Bytes::from(payload),
        }
    }

    #[test]
    fn test_parse_and_extract_members() {
        let objstm = ObjectStream::parse(&sample_stream()).unwrap();
        assert_eq!(objstm.len(), 2);

        let first = objstm.member_at(0, Some(7)).unwrap();
        assert_eq!(first.as_dict().unwrap().get("A").unwrap().as_integer(), Some(1));

        let second = objstm.member_at(1, Some(8)).unwrap();
        assert_eq!(second.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_index_out_of_range() {
        let objstm = ObjectStream::parse(&sample_stream()).unwrap();
        assert!(objstm.member_at(5, None).is_err());
    }

    #[test]
    fn test_wrong_type_rejected() {
        let mut dict = Dict::new();
        dict.insert("Type".to_string(), Object::Name("XObject".to_string()));
        let obj = Object::Stream {
            dict,
            data: bytes::Bytes::new(),
        };
        assert!(ObjectStream::parse(&obj).is_err());
    }
}
