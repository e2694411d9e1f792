//! Cross-reference parsing.
//!
//! Locates and parses the cross-reference information of a PDF: the
//! `startxref` pointer, traditional xref tables, cross-reference streams
//! (PDF 1.5+), and the `/Prev` chain left behind by incremental updates.
//! Hybrid-reference files (`/XRefStm`) are supported.

use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};
use crate::object::{Dict, Object};
use crate::parser::parse_indirect_object;

/// A single cross-reference entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// Free entry; the object is absent
    Free {
        /// Object number of the next free object
        next_free: u32,
        /// Generation to use if the number is reused
        gen: u16,
    },
    /// Object stored as a direct indirect object at a byte offset
    Uncompressed {
        /// Byte offset from the start of the file
        offset: u64,
        /// Generation number
        gen: u16,
    },
    /// Object stored inside an object stream
    InStream {
        /// Object number of the containing stream
        stream_obj: u32,
        /// Index of the object within the stream
        index: u16,
    },
}

impl XRefEntry {
    /// Whether this entry points at a live object.
    pub fn in_use(&self) -> bool {
        !matches!(self, XRefEntry::Free { .. })
    }
}

/// Cross-reference table: object number → entry, plus the trailer dictionary.
#[derive(Debug, Clone, Default)]
pub struct CrossRefTable {
    entries: HashMap<u32, XRefEntry>,
    trailer: Dict,
}

impl CrossRefTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the trailer dictionary.
    pub fn set_trailer(&mut self, trailer: Dict) {
        self.trailer = trailer;
    }

    /// The trailer dictionary of the newest xref section.
    pub fn trailer(&self) -> &Dict {
        &self.trailer
    }

    /// Add an entry. An existing entry for the number wins (newest first).
    pub fn add_entry(&mut self, object_number: u32, entry: XRefEntry) {
        self.entries.entry(object_number).or_insert(entry);
    }

    /// Look up an entry by object number.
    pub fn get(&self, object_number: u32) -> Option<&XRefEntry> {
        self.entries.get(&object_number)
    }

    /// Iterate all known object numbers.
    pub fn object_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.keys().copied()
    }

    /// Highest object number plus one, per the trailer `/Size` or observed.
    pub fn size(&self) -> u32 {
        let observed = self.entries.keys().max().map(|n| n + 1).unwrap_or(0);
        self.trailer
            .get("Size")
            .and_then(|o| o.as_integer())
            .map(|s| s as u32)
            .unwrap_or(0)
            .max(observed)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Find the byte offset of the newest xref section by scanning backwards
/// for the `startxref` keyword.
pub fn find_startxref(buf: &[u8]) -> Result<u64> {
    let tail_len = buf.len().min(2048);
    let tail = &buf[buf.len() - tail_len..];
    let content = String::from_utf8_lossy(tail);

    let pos = content.rfind("startxref").ok_or(Error::InvalidXref)?;
    let after = &content[pos + "startxref".len()..];

    for line in after.lines() {
        let trimmed = line.trim();
        if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
            return trimmed.parse::<u64>().map_err(|_| Error::InvalidXref);
        }
    }

    Err(Error::InvalidXref)
}

/// Parse the full cross-reference state reachable from `offset`,
/// following `/Prev` and `/XRefStm` with a cycle guard.
pub fn parse_xref_chain(buf: &[u8], offset: u64) -> Result<CrossRefTable> {
    let mut table = CrossRefTable::new();
    let mut visited: HashSet<u64> = HashSet::new();
    let mut pending = vec![offset];
    let mut first = true;

    while let Some(offset) = pending.pop() {
        if !visited.insert(offset) {
            log::warn!("Cyclic /Prev chain at offset {}", offset);
            continue;
        }
        if visited.len() > 100 {
            return Err(Error::InvalidPdf("xref /Prev chain depth exceeded 100".to_string()));
        }

        let section = parse_xref_section(buf, offset)?;

        if first {
            table.set_trailer(section.trailer().clone());
            first = false;
        }
        for num in section.object_numbers() {
            if let Some(entry) = section.get(num) {
                table.add_entry(num, *entry);
            }
        }

        // Precedence is newest-first; the stack pops the /XRefStm before
        // the /Prev section, so push /Prev first.
        if let Some(prev) = section.trailer().get("Prev").and_then(|o| o.as_integer()) {
            pending.push(prev as u64);
        }
        // Hybrid-reference: the table's trailer points at a supplementary
        // xref stream covering compressed objects.
        if let Some(stm) = section.trailer().get("XRefStm").and_then(|o| o.as_integer()) {
            pending.push(stm as u64);
        }
    }

    Ok(table)
}

/// Parse a single xref section (table or stream) at `offset`.
fn parse_xref_section(buf: &[u8], offset: u64) -> Result<CrossRefTable> {
    let start = offset as usize;
    if start >= buf.len() {
        return Err(Error::InvalidXref);
    }

    let head = &buf[start..buf.len().min(start + 20)];
    let head_str = String::from_utf8_lossy(head);
    let trimmed = head_str.trim_start();

    log::debug!("Parsing xref section at offset {}", offset);

    if trimmed.starts_with("xref") {
        parse_traditional_xref(buf, start)
    } else if trimmed.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        parse_xref_stream(buf, start)
    } else {
        Err(Error::InvalidXref)
    }
}

/// Parse a traditional cross-reference table and its trailer.
///
/// ```text
/// xref
/// 0 6
/// 0000000000 65535 f
/// 0000000018 00000 n
/// ...
/// trailer
/// << /Size 6 /Root 1 0 R >>
/// ```
fn parse_traditional_xref(buf: &[u8], start: usize) -> Result<CrossRefTable> {
    let mut xref = CrossRefTable::new();
    let mut pos = start;

    // "xref" keyword line
    let line = read_line(buf, &mut pos).ok_or(Error::InvalidXref)?;
    if !line.trim_start().starts_with("xref") {
        return Err(Error::InvalidXref);
    }

    loop {
        let line_start = pos;
        let line = match read_line(buf, &mut pos) {
            Some(l) => l,
            None => break,
        };
        let trimmed = line.trim();

        if trimmed.starts_with("trailer") {
            pos = line_start + line.find("trailer").unwrap_or(0) + "trailer".len();
            break;
        }
        if trimmed.is_empty() || trimmed.starts_with('%') {
            continue;
        }

        // Subsection header: "start_obj count"
        let parts: Vec<&str> = trimmed.split_whitespace().collect();
        if parts.len() != 2 {
            continue;
        }
        let start_obj: u32 = parts[0].parse().map_err(|_| Error::InvalidXref)?;
        let count: u32 = parts[1].parse().map_err(|_| Error::InvalidXref)?;
        if count > 1_000_000 {
            return Err(Error::InvalidPdf("xref subsection count exceeds limit".to_string()));
        }

        let mut i = 0;
        while i < count {
            let entry_line = match read_line(buf, &mut pos) {
                Some(l) => l,
                None => break,
            };
            let trimmed = entry_line.trim();
            if trimmed.is_empty() {
                continue;
            }

            // Entry: "nnnnnnnnnn ggggg f|n"
            let parts: Vec<&str> = trimmed.split_whitespace().collect();
            if parts.len() < 3 {
                log::warn!("Malformed xref entry: {:?}", trimmed);
                xref.add_entry(start_obj + i, XRefEntry::Free { next_free: 0, gen: 65535 });
                i += 1;
                continue;
            }

            let offset: u64 = parts[0].parse().unwrap_or(0);
            let gen: u16 = parts[1].parse().unwrap_or(65535);
            let entry = match parts[2].chars().next() {
                Some('n') | Some('N') => XRefEntry::Uncompressed { offset, gen },
                _ => XRefEntry::Free {
                    next_free: offset as u32,
                    gen,
                },
            };
            xref.add_entry(start_obj + i, entry);
            i += 1;
        }
    }

    // Trailer dictionary follows the keyword
    let (_, trailer_obj) = crate::parser::parse_object(&buf[pos.min(buf.len())..])
        .map_err(|_| Error::InvalidXref)?;
    match trailer_obj {
        Object::Dictionary(dict) => xref.set_trailer(dict),
        _ => return Err(Error::InvalidXref),
    }

    Ok(xref)
}

/// Parse a cross-reference stream (`/Type /XRef`).
///
/// The stream dictionary doubles as the trailer. `/W` gives the three
/// field widths; a zero first width defaults the type field to 1.
fn parse_xref_stream(buf: &[u8], start: usize) -> Result<CrossRefTable> {
    let parsed = parse_indirect_object(buf, start, &|_| None)?;
    let (dict, data) = match &parsed.object {
        Object::Stream { dict, .. } => {
            (dict.clone(), parsed.object.decode_stream_data()?)
        },
        _ => return Err(Error::InvalidXref),
    };

    let widths: Vec<usize> = dict
        .get("W")
        .and_then(|o| o.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|o| o.as_integer())
                .map(|n| n as usize)
                .collect()
        })
        .ok_or(Error::InvalidXref)?;
    if widths.len() != 3 {
        return Err(Error::InvalidXref);
    }

    let size = dict
        .get("Size")
        .and_then(|o| o.as_integer())
        .ok_or(Error::InvalidXref)? as u32;

    // /Index defaults to [0 Size]
    let index: Vec<(u32, u32)> = match dict.get("Index").and_then(|o| o.as_array()) {
        Some(arr) => {
            let nums: Vec<i64> = arr.iter().filter_map(|o| o.as_integer()).collect();
            nums.chunks(2)
                .filter(|c| c.len() == 2)
                .map(|c| (c[0] as u32, c[1] as u32))
                .collect()
        },
        None => vec![(0, size)],
    };

    let entry_width: usize = widths.iter().sum();
    if entry_width == 0 {
        return Err(Error::InvalidXref);
    }

    let mut xref = CrossRefTable::new();
    let mut cursor = 0usize;

    for (first, count) in index {
        for i in 0..count {
            if cursor + entry_width > data.len() {
                log::warn!("xref stream data ended early at entry {}", first + i);
                break;
            }
            let mut fields = [0u64; 3];
            for (f, width) in widths.iter().enumerate() {
                let mut value: u64 = 0;
                for _ in 0..*width {
                    value = (value << 8) | data[cursor] as u64;
                    cursor += 1;
                }
                fields[f] = value;
            }
            // A zero-width type field defaults to type 1
            let entry_type = if widths[0] == 0 { 1 } else { fields[0] };
            let entry = match entry_type {
                0 => XRefEntry::Free {
                    next_free: fields[1] as u32,
                    gen: fields[2] as u16,
                },
                1 => XRefEntry::Uncompressed {
                    offset: fields[1],
                    gen: fields[2] as u16,
                },
                2 => XRefEntry::InStream {
                    stream_obj: fields[1] as u32,
                    index: fields[2] as u16,
                },
                other => {
                    log::warn!("Unknown xref stream entry type {}", other);
                    continue;
                },
            };
            xref.add_entry(first + i, entry);
        }
    }

    let mut trailer = dict;
    trailer.remove("Filter");
    trailer.remove("DecodeParms");
    trailer.remove("Length");
    trailer.remove("W");
    trailer.remove("Index");
    xref.set_trailer(trailer);

    Ok(xref)
}

/// Read one line (terminated by CR, LF or CRLF) advancing `pos`.
fn read_line<'a>(buf: &'a [u8], pos: &mut usize) -> Option<std::borrow::Cow<'a, str>> {
    if *pos >= buf.len() {
        return None;
    }
    let start = *pos;
    let mut end = start;
    while end < buf.len() && buf[end] != b'\r' && buf[end] != b'\n' {
        end += 1;
    }
    let line = String::from_utf8_lossy(&buf[start..end]);
    *pos = end;
    if *pos < buf.len() && buf[*pos] == b'\r' {
        *pos += 1;
    }
    if *pos < buf.len() && buf[*pos] == b'\n' {
        *pos += 1;
    }
    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &[u8] = b"xref\n0 3\n0000000000 65535 f \n0000000018 00000 n \n0000000100 00000 n \ntrailer\n<< /Size 3 /Root 1 0 R >>\nstartxref\n0\n%%EOF\n";

    #[test]
    fn test_find_startxref() {
        assert_eq!(find_startxref(SIMPLE).unwrap(), 0);
    }

    #[test]
    fn test_parse_traditional_table() {
        let table = parse_xref_chain(SIMPLE, 0).unwrap();
        assert_eq!(table.len(), 3);
        assert!(!table.get(0).unwrap().in_use());
        assert_eq!(
            table.get(1),
            Some(&XRefEntry::Uncompressed { offset: 18, gen: 0 })
        );
        assert_eq!(table.trailer().get("Size").unwrap().as_integer(), Some(3));
    }

    #[test]
    fn test_newest_entry_wins() {
        let mut table = CrossRefTable::new();
        table.add_entry(5, XRefEntry::Uncompressed { offset: 999, gen: 0 });
        // An older section's entry for the same number must not override
        table.add_entry(5, XRefEntry::Uncompressed { offset: 1, gen: 0 });
        assert_eq!(table.get(5), Some(&XRefEntry::Uncompressed { offset: 999, gen: 0 }));
    }

    #[test]
    fn test_missing_startxref() {
        assert!(find_startxref(b"not a pdf at all").is_err());
    }

    #[test]
    fn test_size_prefers_observed_max() {
        let mut table = CrossRefTable::new();
        table.add_entry(41, XRefEntry::Uncompressed { offset: 10, gen: 0 });
        assert_eq!(table.size(), 42);
    }
}
