//! PDF object serialization.
//!
//! Converts [`Object`] values to their byte representation. Output is
//! deterministic: dictionary keys are written sorted and reals are
//! formatted with a fixed rule, so identical inputs always produce
//! identical bytes.

use std::io::Write;

use crate::encryption::EncryptionHandler;
use crate::object::{Dict, Object};

/// Serializer for PDF objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectSerializer;

impl ObjectSerializer {
    /// Create a new serializer.
    pub fn new() -> Self {
        Self
    }

    /// Serialize an object to bytes.
    pub fn serialize(&self, obj: &Object) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_object(&mut buf, obj, None, 0, 0).unwrap();
        buf
    }

    /// Serialize an indirect object definition:
    /// `{id} {gen} obj\n{body}\nendobj\n`.
    pub fn serialize_indirect(&self, id: u32, gen: u16, obj: &Object) -> Vec<u8> {
        let mut buf = Vec::new();
        writeln!(buf, "{} {} obj", id, gen).unwrap();
        self.write_object(&mut buf, obj, None, id, gen).unwrap();
        write!(buf, "\nendobj\n").unwrap();
        buf
    }

    /// Serialize an indirect object, encrypting strings and stream
    /// payloads with the document's file key.
    pub fn serialize_indirect_encrypted(
        &self,
        id: u32,
        gen: u16,
        obj: &Object,
        handler: &EncryptionHandler,
    ) -> Vec<u8> {
        let mut buf = Vec::new();
        writeln!(buf, "{} {} obj", id, gen).unwrap();
        self.write_object(&mut buf, obj, Some(handler), id, gen).unwrap();
        write!(buf, "\nendobj\n").unwrap();
        buf
    }

    fn write_object<W: Write>(
        &self,
        w: &mut W,
        obj: &Object,
        enc: Option<&EncryptionHandler>,
        obj_num: u32,
        gen_num: u16,
    ) -> std::io::Result<()> {
        match obj {
            Object::Null => write!(w, "null"),
            Object::Boolean(b) => write!(w, "{}", if *b { "true" } else { "false" }),
            Object::Integer(i) => write!(w, "{}", i),
            Object::Real(r) => self.write_real(w, *r),
            Object::String(s) => {
                let bytes = match enc {
                    Some(handler) => handler
                        .encrypt(s, obj_num, gen_num)
                        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?,
                    None => s.clone(),
                };
                self.write_string(w, &bytes)
            },
            Object::Name(n) => self.write_name(w, n),
            Object::Array(arr) => {
                write!(w, "[")?;
                for (i, item) in arr.iter().enumerate() {
                    if i > 0 {
                        write!(w, " ")?;
                    }
                    self.write_object(w, item, enc, obj_num, gen_num)?;
                }
                write!(w, "]")
            },
            Object::Dictionary(dict) => self.write_dictionary(w, dict, enc, obj_num, gen_num),
            Object::Stream { dict, data } => {
                let payload = match enc {
                    Some(handler) => handler
                        .encrypt(data, obj_num, gen_num)
                        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?,
                    None => data.to_vec(),
                };
                let mut dict_with_length = dict.clone();
                dict_with_length
                    .insert("Length".to_string(), Object::Integer(payload.len() as i64));
                // Strings inside a stream dictionary are encrypted like any other
                self.write_dictionary(w, &dict_with_length, enc, obj_num, gen_num)?;
                write!(w, "\nstream\n")?;
                w.write_all(&payload)?;
                write!(w, "\nendstream")
            },
            Object::Reference(r) => write!(w, "{} {} R", r.id, r.gen),
        }
    }

    fn write_dictionary<W: Write>(
        &self,
        w: &mut W,
        dict: &Dict,
        enc: Option<&EncryptionHandler>,
        obj_num: u32,
        gen_num: u16,
    ) -> std::io::Result<()> {
        write!(w, "<<")?;

        let mut keys: Vec<_> = dict.keys().collect();
        keys.sort();

        for key in keys {
            if let Some(value) = dict.get(key) {
                write!(w, " ")?;
                self.write_name(w, key)?;
                write!(w, " ")?;
                self.write_object(w, value, enc, obj_num, gen_num)?;
            }
        }

        write!(w, " >>")
    }

    /// Write a string, choosing hex form when the bytes are mostly binary.
    fn write_string<W: Write>(&self, w: &mut W, bytes: &[u8]) -> std::io::Result<()> {
        let printable = bytes
            .iter()
            .filter(|b| (0x20..0x7F).contains(*b) || matches!(b, b'\n' | b'\r' | b'\t'))
            .count();
        if bytes.len() > 4 && printable * 4 < bytes.len() * 3 {
            write!(w, "<")?;
            for b in bytes {
                write!(w, "{:02X}", b)?;
            }
            return write!(w, ">");
        }

        write!(w, "(")?;
        for &b in bytes {
            match b {
                b'(' => w.write_all(b"\\(")?,
                b')' => w.write_all(b"\\)")?,
                b'\\' => w.write_all(b"\\\\")?,
                b'\n' => w.write_all(b"\\n")?,
                b'\r' => w.write_all(b"\\r")?,
                0x20..=0x7E => w.write_all(&[b])?,
                other => write!(w, "\\{:03o}", other)?,
            }
        }
        write!(w, ")")
    }

    /// Write a name, escaping delimiters and non-regular bytes as #XX.
    fn write_name<W: Write>(&self, w: &mut W, name: &str) -> std::io::Result<()> {
        write!(w, "/")?;
        for &b in name.as_bytes() {
            let needs_escape = matches!(
                b,
                0..=0x20 | 0x7F.. | b'/' | b'%' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'#'
            );
            if needs_escape {
                write!(w, "#{:02X}", b)?;
            } else {
                w.write_all(&[b])?;
            }
        }
        Ok(())
    }

    /// Write a real with trailing zeros trimmed (1.5, not 1.5000).
    fn write_real<W: Write>(&self, w: &mut W, value: f64) -> std::io::Result<()> {
        if value == value.trunc() && value.abs() < 1e15 {
            write!(w, "{}", value.trunc() as i64)
        } else {
            let formatted = format!("{:.6}", value);
            let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
            write!(w, "{}", trimmed)
        }
    }
}
