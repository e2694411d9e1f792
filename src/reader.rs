//! PDF document reader.
//!
//! [`PdfReader`] presents the document as a graph of typed objects
//! addressable by `(object_number, generation)`. It owns the raw bytes,
//! the cross-reference state, the decryption handler, and the page list,
//! and provides the append-only incremental writer used by the safe
//! modifier.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::encryption::EncryptionHandler;
use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectRef};
use crate::objstm::ObjectStream;
use crate::parser::parse_indirect_object;
use crate::serializer::ObjectSerializer;
use crate::xref::{find_startxref, parse_xref_chain, CrossRefTable, XRefEntry};

/// Maximum reference → reference chain length.
const MAX_RESOLVE_DEPTH: u32 = 32;

/// One page of the document with the bits field processing needs.
#[derive(Debug, Clone)]
pub struct PageInfo {
    /// 1-based page number
    pub number: u32,
    /// Reference of the page object
    pub page_ref: ObjectRef,
    /// The page dictionary (inherited attributes not resolved)
    pub dict: Dict,
}

/// Reader over one PDF document, loaded fully into memory.
pub struct PdfReader {
    buf: Vec<u8>,
    path: PathBuf,
    header_offset: usize,
    version: (u8, u8),
    startxref: u64,
    xref: CrossRefTable,
    encryption: Option<EncryptionHandler>,
    cache: HashMap<ObjectRef, Object>,
    objstm_cache: HashMap<u32, ObjectStream>,
    pages: Vec<PageInfo>,
    annot_pages: HashMap<ObjectRef, u32>,
}

impl PdfReader {
    /// Open a PDF file, optionally decrypting it with `passphrase`.
    pub fn open(path: impl AsRef<Path>, passphrase: Option<&str>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let buf = std::fs::read(&path)?;
        Self::from_bytes(buf, path, passphrase)
    }

    /// Build a reader from raw bytes (used by post-apply validation).
    pub fn from_bytes(
        buf: Vec<u8>,
        path: impl Into<PathBuf>,
        passphrase: Option<&str>,
    ) -> Result<Self> {
        let path = path.into();
        let (header_offset, version) = parse_header(&buf)?;
        let startxref = find_startxref(&buf)?;
        let xref = parse_xref_chain(&buf, startxref + header_offset as u64).or_else(|e| {
            // Offsets may be relative to the true file start even with a
            // shifted header
            if header_offset > 0 {
                parse_xref_chain(&buf, startxref)
            } else {
                Err(e)
            }
        })?;

        log::debug!(
            "Opened {} (PDF {}.{}, {} xref entries)",
            path.display(),
            version.0,
            version.1,
            xref.len()
        );

        let mut reader = Self {
            buf,
            path,
            header_offset,
            version,
            startxref,
            xref,
            encryption: None,
            cache: HashMap::new(),
            objstm_cache: HashMap::new(),
            pages: Vec::new(),
            annot_pages: HashMap::new(),
        };

        reader.setup_encryption(passphrase)?;
        reader.build_page_list()?;
        Ok(reader)
    }

    /// PDF version from the header.
    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    /// Path this reader was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the document is encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.encryption.is_some()
    }

    /// The trailer dictionary of the newest xref section.
    pub fn trailer(&self) -> &Dict {
        self.xref.trailer()
    }

    /// The document catalog dictionary.
    pub fn root(&mut self) -> Result<Dict> {
        let root_ref = self
            .trailer()
            .get("Root")
            .cloned()
            .ok_or_else(|| Error::InvalidPdf("trailer has no /Root".to_string()))?;
        let catalog = self.resolve_obj(&root_ref)?;
        catalog
            .as_dict()
            .cloned()
            .ok_or_else(|| Error::InvalidPdf("catalog is not a dictionary".to_string()))
    }

    /// The pages of the document, in document order.
    pub fn pages(&self) -> &[PageInfo] {
        &self.pages
    }

    /// 1-based page number that holds the given annotation, if known.
    pub fn page_of_annotation(&self, annot: ObjectRef) -> Option<u32> {
        self.annot_pages.get(&annot).copied()
    }

    /// Resolve an indirect reference to its object.
    pub fn resolve(&mut self, obj_ref: ObjectRef) -> Result<Object> {
        if let Some(cached) = self.cache.get(&obj_ref) {
            return Ok(cached.clone());
        }

        let entry = *self
            .xref
            .get(obj_ref.id)
            .ok_or(Error::ObjectNotFound(obj_ref.id, obj_ref.gen))?;

        let object = match entry {
            XRefEntry::Free { .. } => {
                return Err(Error::ObjectNotFound(obj_ref.id, obj_ref.gen))
            },
            XRefEntry::Uncompressed { offset, .. } => {
                let abs = offset as usize + self.header_offset;
                let parsed = parse_indirect_object(&self.buf, abs, &|len_ref| {
                    self.resolve_integer_raw(len_ref)
                })?;
                if parsed.obj_ref.id != obj_ref.id {
                    log::warn!(
                        "xref points {} at object {}, using it anyway",
                        obj_ref,
                        parsed.obj_ref
                    );
                }
                let mut object = parsed.object;
                if let Some(handler) = &self.encryption {
                    if !self.is_encryption_exempt(obj_ref) {
                        object = decrypt_object(object, handler, obj_ref)?;
                    }
                }
                object
            },
            XRefEntry::InStream { stream_obj, index } => {
                self.load_objstm(stream_obj)?;
                let objstm = self
                    .objstm_cache
                    .get(&stream_obj)
                    .ok_or(Error::ObjectNotFound(stream_obj, 0))?;
                // Members of an encrypted object stream were covered by the
                // stream payload decryption; no per-string pass here.
                objstm.member_at(index as usize, Some(obj_ref.id))?
            },
        };

        self.cache.insert(obj_ref, object.clone());
        Ok(object)
    }

    /// Resolve an object that may be a reference (or chain of references).
    pub fn resolve_obj(&mut self, obj: &Object) -> Result<Object> {
        let mut current = obj.clone();
        for _ in 0..MAX_RESOLVE_DEPTH {
            match current.as_reference() {
                Some(r) => current = self.resolve(r)?,
                None => return Ok(current),
            }
        }
        Err(Error::RecursionLimitExceeded(MAX_RESOLVE_DEPTH))
    }

    /// Resolve a dictionary entry, following references.
    pub fn dict_get(&mut self, dict: &Dict, key: &str) -> Result<Option<Object>> {
        match dict.get(key) {
            Some(obj) => Ok(Some(self.resolve_obj(obj)?)),
            None => Ok(None),
        }
    }

    /// All in-use object references known to the xref.
    pub fn all_refs(&self) -> Vec<ObjectRef> {
        let mut refs: Vec<ObjectRef> = self
            .xref
            .object_numbers()
            .filter(|n| self.xref.get(*n).map(|e| e.in_use()).unwrap_or(false))
            .map(|n| ObjectRef::new(n, 0))
            .collect();
        refs.sort();
        refs
    }

    /// Write an incremental update: the original bytes are copied to
    /// `out_path` untouched and a new body + xref section is appended that
    /// shadows the updated objects.
    ///
    /// Updated strings and streams are re-encrypted when the source
    /// document is encrypted. Serialization is deterministic, so applying
    /// the same updates twice produces identical output bytes.
    pub fn write_incremental(
        &self,
        updates: &[(ObjectRef, Object)],
        out_path: impl AsRef<Path>,
    ) -> Result<()> {
        let out_path = out_path.as_ref();
        let file = File::create(out_path)?;
        let mut writer = CountingWriter::new(BufWriter::new(file));

        writer.write_all(&self.buf)?;
        if self.buf.last() != Some(&b'\n') {
            writer.write_all(b"\n")?;
        }

        let serializer = ObjectSerializer::new();
        let mut ordered: Vec<&(ObjectRef, Object)> = updates.iter().collect();
        ordered.sort_by_key(|(r, _)| *r);

        let mut entries: Vec<(u32, u64, u16)> = Vec::with_capacity(ordered.len());
        for (obj_ref, obj) in ordered {
            let offset = writer.position();
            let bytes = match &self.encryption {
                Some(handler) => {
                    serializer.serialize_indirect_encrypted(obj_ref.id, obj_ref.gen, obj, handler)
                },
                None => serializer.serialize_indirect(obj_ref.id, obj_ref.gen, obj),
            };
            writer.write_all(&bytes)?;
            entries.push((obj_ref.id, offset, obj_ref.gen));
        }

        // Conventional xref section, one subsection per contiguous id run
        let xref_offset = writer.position();
        writer.write_all(b"xref\n")?;
        entries.sort_by_key(|(id, _, _)| *id);
        let mut i = 0;
        while i < entries.len() {
            let run_start = i;
            while i + 1 < entries.len() && entries[i + 1].0 == entries[i].0 + 1 {
                i += 1;
            }
            i += 1;
            let run = &entries[run_start..i];
            writeln!(writer, "{} {}", run[0].0, run.len())?;
            for (_, offset, gen) in run {
                write!(writer, "{:010} {:05} n \n", offset, gen)?;
            }
        }

        // Trailer carries /Prev so readers see the shadowed originals
        let new_size = self
            .xref
            .size()
            .max(entries.iter().map(|(id, _, _)| id + 1).max().unwrap_or(0));
        let mut trailer = Dict::new();
        trailer.insert("Size".to_string(), Object::Integer(new_size as i64));
        trailer.insert("Prev".to_string(), Object::Integer(self.startxref as i64));
        for key in ["Root", "Info", "ID", "Encrypt"] {
            if let Some(value) = self.trailer().get(key) {
                trailer.insert(key.to_string(), value.clone());
            }
        }

        writer.write_all(b"trailer\n")?;
        writer.write_all(&serializer.serialize(&Object::Dictionary(trailer)))?;
        write!(writer, "\nstartxref\n{}\n%%EOF\n", xref_offset)?;
        writer.flush()?;

        log::debug!(
            "Wrote incremental update with {} objects to {}",
            entries.len(),
            out_path.display()
        );
        Ok(())
    }

    /// Authenticate against `/Encrypt` when present.
    fn setup_encryption(&mut self, passphrase: Option<&str>) -> Result<()> {
        let encrypt_entry = match self.trailer().get("Encrypt") {
            Some(obj) => obj.clone(),
            None => return Ok(()),
        };

        // The /Encrypt dictionary itself is never encrypted
        let encrypt_obj = self.resolve_obj(&encrypt_entry)?;

        let file_id = self
            .trailer()
            .get("ID")
            .and_then(|o| o.as_array())
            .and_then(|arr| arr.first())
            .and_then(|o| o.as_string())
            .map(|s| s.to_vec())
            .unwrap_or_default();

        let handler = EncryptionHandler::authenticate(&encrypt_obj, &file_id, passphrase)?;
        self.encryption = Some(handler);
        // Anything cached before authentication may hold ciphertext
        self.cache.clear();
        self.objstm_cache.clear();
        if let Some(r) = encrypt_entry.as_reference() {
            // Keep the raw /Encrypt dictionary exempt from decryption
            self.cache.insert(r, encrypt_obj);
        }
        Ok(())
    }

    /// Whether the object is exempt from decryption.
    fn is_encryption_exempt(&self, obj_ref: ObjectRef) -> bool {
        self.trailer()
            .get("Encrypt")
            .and_then(|o| o.as_reference())
            .map(|r| r == obj_ref)
            .unwrap_or(false)
    }

    /// Walk the page tree and index annotation → page associations.
    fn build_page_list(&mut self) -> Result<()> {
        let catalog = self.root()?;
        let pages_obj = match self.dict_get(&catalog, "Pages")? {
            Some(obj) => obj,
            None => return Ok(()),
        };
        let pages_ref = catalog.get("Pages").and_then(|o| o.as_reference());

        let mut stack = vec![(pages_obj, pages_ref)];
        let mut visited: std::collections::HashSet<ObjectRef> = std::collections::HashSet::new();
        let mut ordered: Vec<(ObjectRef, Dict)> = Vec::new();

        while let Some((node, node_ref)) = stack.pop() {
            if let Some(r) = node_ref {
                if !visited.insert(r) {
                    log::warn!("Cyclic page tree at {}", r);
                    continue;
                }
            }
            let dict = match node.as_dict() {
                Some(d) => d.clone(),
                None => continue,
            };
            match dict.get("Type").and_then(|o| o.as_name()) {
                Some("Pages") => {
                    if let Some(kids) = self.dict_get(&dict, "Kids")?.and_then(|k| {
                        k.as_array().cloned()
                    }) {
                        // Reverse so the stack pops kids in document order
                        for kid in kids.iter().rev() {
                            let kid_ref = kid.as_reference();
                            let resolved = self.resolve_obj(kid)?;
                            stack.push((resolved, kid_ref));
                        }
                    }
                },
                _ => {
                    // Treat any leaf dictionary as a page
                    if let Some(r) = node_ref {
                        ordered.push((r, dict));
                    }
                },
            }
        }

        for (idx, (page_ref, dict)) in ordered.into_iter().enumerate() {
            let number = idx as u32 + 1;
            if let Some(annots) = self.dict_get(&dict, "Annots")?.and_then(|a| {
                a.as_array().cloned()
            }) {
                for annot in annots {
                    if let Some(r) = annot.as_reference() {
                        self.annot_pages.insert(r, number);
                    }
                }
            }
            self.pages.push(PageInfo {
                number,
                page_ref,
                dict,
            });
        }

        log::debug!("Indexed {} pages", self.pages.len());
        Ok(())
    }

    /// Load and cache an object stream container.
    fn load_objstm(&mut self, stream_obj: u32) -> Result<()> {
        if self.objstm_cache.contains_key(&stream_obj) {
            return Ok(());
        }
        let container = self.resolve(ObjectRef::new(stream_obj, 0))?;
        let parsed = ObjectStream::parse(&container)?;
        self.objstm_cache.insert(stream_obj, parsed);
        Ok(())
    }

    /// Resolve an integer object without decryption or caching; used for
    /// indirect /Length values while a stream is being sliced.
    fn resolve_integer_raw(&self, obj_ref: ObjectRef) -> Option<i64> {
        let entry = self.xref.get(obj_ref.id)?;
        if let XRefEntry::Uncompressed { offset, .. } = entry {
            let abs = *offset as usize + self.header_offset;
            let parsed = parse_indirect_object(&self.buf, abs, &|_| None).ok()?;
            parsed.object.as_integer()
        } else {
            None
        }
    }
}

/// Parse the `%PDF-M.N` header, tolerating up to 1 KiB of leading junk.
fn parse_header(buf: &[u8]) -> Result<(usize, (u8, u8))> {
    let window = &buf[..buf.len().min(1024)];
    let pos = window
        .windows(5)
        .position(|w| w == b"%PDF-")
        .ok_or_else(|| {
            let head: String = buf
                .iter()
                .take(8)
                .map(|&b| if b.is_ascii_graphic() { b as char } else { '.' })
                .collect();
            Error::InvalidHeader(head)
        })?;

    let rest = &buf[pos + 5..];
    let major = rest
        .first()
        .filter(|b| b.is_ascii_digit())
        .map(|b| b - b'0')
        .ok_or_else(|| Error::InvalidHeader("%PDF-?".to_string()))?;
    let minor = rest
        .get(2)
        .filter(|b| b.is_ascii_digit())
        .map(|b| b - b'0')
        .unwrap_or(0);

    Ok((pos, (major, minor)))
}

/// Writer wrapper tracking the absolute output position.
struct CountingWriter<W: Write> {
    inner: W,
    position: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, position: 0 }
    }

    fn position(&self) -> u64 {
        self.position
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.position += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Recursively decrypt every string and stream payload in an object.
fn decrypt_object(
    obj: Object,
    handler: &EncryptionHandler,
    obj_ref: ObjectRef,
) -> Result<Object> {
    Ok(match obj {
        Object::String(s) => {
            Object::String(handler.decrypt(&s, obj_ref.id, obj_ref.gen)?)
        },
        Object::Array(arr) => Object::Array(
            arr.into_iter()
                .map(|o| decrypt_object(o, handler, obj_ref))
                .collect::<Result<Vec<_>>>()?,
        ),
        Object::Dictionary(dict) => {
            let mut out = Dict::with_capacity(dict.len());
            for (k, v) in dict {
                out.insert(k, decrypt_object(v, handler, obj_ref)?);
            }
            Object::Dictionary(out)
        },
        Object::Stream { dict, data } => {
            let mut out_dict = Dict::with_capacity(dict.len());
            for (k, v) in dict {
                out_dict.insert(k, decrypt_object(v, handler, obj_ref)?);
            }
            // Xref and metadata streams keep their plaintext payloads
            let exempt = matches!(
                out_dict.get("Type").and_then(|o| o.as_name()),
                Some("XRef")
            );
            let payload = if exempt {
                data
            } else {
                bytes::Bytes::from(handler.decrypt(&data, obj_ref.id, obj_ref.gen)?)
            };
            Object::Stream {
                dict: out_dict,
                data: payload,
            }
        },
        other => other,
    })
}
