//! PDF object parser.
//!
//! Combines tokens from the lexer into complete objects (arrays,
//! dictionaries, indirect references) and provides the string decoders the
//! extraction layers share.
//!
//! The parser is recursive descent: read a token, decide how to parse,
//! recurse for composite types. Indirect-object framing (`N G obj ...
//! endobj`) including stream payload slicing lives here too because the
//! payload length may itself be an indirect reference the caller resolves.

use crate::error::{Error, Result};
use crate::lexer::{token, Token};
use crate::object::{Dict, Object, ObjectRef};
use nom::IResult;

/// Decode escape sequences in PDF literal strings.
///
/// Handles `\n \r \t \b \f \( \) \\`, octal `\ddd`, and line
/// continuations. Unknown escapes keep the backslash literally.
pub fn decode_literal_string_escapes(raw: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        if raw[i] == b'\\' && i + 1 < raw.len() {
            match raw[i + 1] {
                b'n' => {
                    result.push(b'\n');
                    i += 2;
                },
                b'r' => {
                    result.push(b'\r');
                    i += 2;
                },
                b't' => {
                    result.push(b'\t');
                    i += 2;
                },
                b'b' => {
                    result.push(8);
                    i += 2;
                },
                b'f' => {
                    result.push(12);
                    i += 2;
                },
                b'(' => {
                    result.push(b'(');
                    i += 2;
                },
                b')' => {
                    result.push(b')');
                    i += 2;
                },
                b'\\' => {
                    result.push(b'\\');
                    i += 2;
                },
                b'\n' => {
                    i += 2;
                },
                b'\r' => {
                    i += 2;
                    if i < raw.len() && raw[i] == b'\n' {
                        i += 1;
                    }
                },
                c if c.is_ascii_digit() && c < b'8' => {
                    let start = i + 1;
                    let mut octal_value = 0u32;
                    let mut octal_len = 0;
                    for j in 0..3 {
                        if start + j < raw.len() {
                            let digit = raw[start + j];
                            if (b'0'..b'8').contains(&digit) {
                                octal_value = octal_value * 8 + (digit - b'0') as u32;
                                octal_len += 1;
                            } else {
                                break;
                            }
                        } else {
                            break;
                        }
                    }
                    result.push((octal_value & 0xFF) as u8);
                    i += 1 + octal_len;
                },
                _ => {
                    result.push(b'\\');
                    i += 1;
                },
            }
        } else {
            result.push(raw[i]);
            i += 1;
        }
    }

    result
}

/// Decode a hex string body (whitespace allowed, odd digit padded with 0).
pub fn decode_hex_string(raw: &[u8]) -> Vec<u8> {
    let digits: Vec<u8> = raw
        .iter()
        .copied()
        .filter(|b| b.is_ascii_hexdigit())
        .collect();
    let mut result = Vec::with_capacity(digits.len() / 2 + 1);
    for pair in digits.chunks(2) {
        let hi = (pair[0] as char).to_digit(16).unwrap_or(0) as u8;
        let lo = if pair.len() == 2 {
            (pair[1] as char).to_digit(16).unwrap_or(0) as u8
        } else {
            0
        };
        result.push((hi << 4) | lo);
    }
    result
}

/// Decode a PDF text string: UTF-16BE with BOM, else PDFDoc encoding.
///
/// PDFDoc encoding is a superset of ISO Latin-1; the 0x80..0x9F block has
/// its own assignments, of which the common punctuation is mapped here.
/// Unmappable bytes are dropped.
pub fn decode_text_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let utf16_pairs: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
            .collect();
        String::from_utf16_lossy(&utf16_pairs)
    } else {
        bytes.iter().filter_map(|&b| pdfdoc_char(b)).collect()
    }
}

/// Encode a text string for writing: ASCII stays literal, anything else
/// becomes UTF-16BE with BOM.
pub fn encode_text_string(s: &str) -> Vec<u8> {
    if s.bytes().all(|b| (0x20..0x7F).contains(&b)) {
        return s.as_bytes().to_vec();
    }
    let mut out = Vec::with_capacity(2 + s.len() * 2);
    out.push(0xFE);
    out.push(0xFF);
    for cu in s.encode_utf16() {
        out.push((cu >> 8) as u8);
        out.push((cu & 0xFF) as u8);
    }
    out
}

/// Map one PDFDoc-encoded byte to a char.
fn pdfdoc_char(b: u8) -> Option<char> {
    match b {
        0x09 | 0x0A | 0x0D => Some(' '),
        0x20..=0x7E => Some(b as char),
        // Common PDFDoc 0x80..0x9F punctuation assignments
        0x85 => Some('…'),
        0x8B => Some('‹'),
        0x8C => Some('Œ'),
        0x91 => Some('\u{2018}'),
        0x92 => Some('\u{2019}'),
        0x93 => Some('\u{201C}'),
        0x94 => Some('\u{201D}'),
        0x95 => Some('•'),
        0x96 => Some('–'),
        0x97 => Some('—'),
        0xA0..=0xFF => Some(char::from_u32(b as u32)?),
        _ => None,
    }
}

/// Parse a PDF object from input bytes.
///
/// Handles all object types: null, booleans, numbers, strings, names,
/// arrays, dictionaries, and indirect references (`10 0 R`).
pub fn parse_object(input: &[u8]) -> IResult<&[u8], Object> {
    let (input, tok) = token(input)?;

    match tok {
        Token::Null => Ok((input, Object::Null)),
        Token::True => Ok((input, Object::Boolean(true))),
        Token::False => Ok((input, Object::Boolean(false))),

        Token::Integer(i) => {
            // Could be a plain integer or the start of "obj_num gen R"
            if let Ok((input2, Token::Integer(gen))) = token(input) {
                if let Ok((input3, Token::R)) = token(input2) {
                    return Ok((
                        input3,
                        Object::Reference(ObjectRef::new(i as u32, gen as u16)),
                    ));
                }
            }
            Ok((input, Object::Integer(i)))
        },

        Token::Real(r) => Ok((input, Object::Real(r))),

        Token::LiteralString(bytes) => {
            Ok((input, Object::String(decode_literal_string_escapes(bytes))))
        },

        Token::HexString(bytes) => Ok((input, Object::String(decode_hex_string(bytes)))),

        Token::Name(name) => Ok((input, Object::Name(name))),

        Token::ArrayStart => parse_array_body(input),

        Token::DictStart => parse_dict_body(input),

        _ => Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag))),
    }
}

/// Parse array elements up to the closing `]`.
fn parse_array_body(mut input: &[u8]) -> IResult<&[u8], Object> {
    let mut items = Vec::new();
    loop {
        if let Ok((rest, Token::ArrayEnd)) = token(input) {
            return Ok((rest, Object::Array(items)));
        }
        let (rest, obj) = parse_object(input)?;
        items.push(obj);
        input = rest;
    }
}

/// Parse dictionary entries up to the closing `>>`.
fn parse_dict_body(mut input: &[u8]) -> IResult<&[u8], Object> {
    let mut dict = Dict::new();
    loop {
        match token(input) {
            Ok((rest, Token::DictEnd)) => return Ok((rest, Object::Dictionary(dict))),
            Ok((rest, Token::Name(key))) => {
                let (rest2, val) = parse_object(rest)?;
                dict.insert(key, val);
                input = rest2;
            },
            _ => {
                return Err(nom::Err::Error(nom::error::Error::new(
                    input,
                    nom::error::ErrorKind::Tag,
                )))
            },
        }
    }
}

/// A parsed indirect object: its reference, body, and for streams the
/// byte span of the raw payload within the source buffer.
#[derive(Debug, Clone)]
pub struct IndirectObject {
    /// The object's reference
    pub obj_ref: ObjectRef,
    /// The parsed body (streams carry their raw payload)
    pub object: Object,
}

/// Parse an indirect object (`N G obj ... endobj`) at `offset` in `buf`.
///
/// `resolve_length` maps an indirect `/Length` reference to its value;
/// when it cannot, the payload is delimited by scanning for `endstream`.
pub fn parse_indirect_object(
    buf: &[u8],
    offset: usize,
    resolve_length: &dyn Fn(ObjectRef) -> Option<i64>,
) -> Result<IndirectObject> {
    let input = buf.get(offset..).ok_or(Error::UnexpectedEof)?;

    let (input, id_tok) = token(input).map_err(|_| parse_err(buf, input, "object number"))?;
    let (input, gen_tok) = token(input).map_err(|_| parse_err(buf, input, "generation"))?;
    let (input, obj_tok) = token(input).map_err(|_| parse_err(buf, input, "obj keyword"))?;

    let (id, gen) = match (id_tok, gen_tok, obj_tok) {
        (Token::Integer(id), Token::Integer(gen), Token::ObjStart) => (id as u32, gen as u16),
        _ => {
            return Err(Error::ParseError {
                offset,
                reason: "expected 'N G obj' header".to_string(),
            })
        },
    };
    let obj_ref = ObjectRef::new(id, gen);

    let (after_body, body) =
        parse_object(input).map_err(|_| parse_err(buf, input, "object body"))?;

    // A dictionary may be followed by a stream payload
    if let Object::Dictionary(dict) = &body {
        if let Ok((after_kw, Token::StreamStart)) = token(after_body) {
            let data_start = skip_stream_eol(buf, offset_of(buf, after_kw));
            let length = match dict.get("Length") {
                Some(Object::Integer(n)) => Some(*n),
                Some(Object::Reference(r)) => resolve_length(*r),
                _ => None,
            };

            let data_end = match length {
                Some(n) if n >= 0 && data_start + n as usize <= buf.len() => {
                    data_start + n as usize
                },
                _ => find_endstream(buf, data_start).ok_or(Error::ParseError {
                    offset: data_start,
                    reason: "unterminated stream".to_string(),
                })?,
            };

            let data = bytes::Bytes::copy_from_slice(&buf[data_start..data_end]);
            return Ok(IndirectObject {
                obj_ref,
                object: Object::Stream {
                    dict: dict.clone(),
                    data,
                },
            });
        }
    }

    Ok(IndirectObject {
        obj_ref,
        object: body,
    })
}

/// Skip the single EOL marker after the `stream` keyword.
fn skip_stream_eol(buf: &[u8], mut pos: usize) -> usize {
    if pos < buf.len() && buf[pos] == b'\r' {
        pos += 1;
    }
    if pos < buf.len() && buf[pos] == b'\n' {
        pos += 1;
    }
    pos
}

/// Locate the `endstream` keyword, returning the payload end offset.
fn find_endstream(buf: &[u8], start: usize) -> Option<usize> {
    let needle = b"endstream";
    let hay = buf.get(start..)?;
    hay.windows(needle.len())
        .position(|w| w == needle)
        .map(|p| {
            // Trim the EOL that precedes the keyword
            let mut end = start + p;
            if end > start && buf[end - 1] == b'\n' {
                end -= 1;
            }
            if end > start && buf[end - 1] == b'\r' {
                end -= 1;
            }
            end
        })
}

/// Absolute offset of `slice` within `buf` (slice must be derived from buf).
fn offset_of(buf: &[u8], slice: &[u8]) -> usize {
    slice.as_ptr() as usize - buf.as_ptr() as usize
}

fn parse_err(buf: &[u8], at: &[u8], what: &str) -> Error {
    Error::ParseError {
        offset: offset_of(buf, at),
        reason: format!("expected {}", what),
    }
}
