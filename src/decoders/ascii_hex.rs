//! ASCIIHexDecode implementation.
//!
//! Pairs of hex digits become bytes; whitespace is ignored; `>` marks EOD;
//! a trailing odd digit is padded with 0.

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};

/// ASCIIHexDecode filter implementation.
pub struct AsciiHexDecoder;

impl StreamDecoder for AsciiHexDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::with_capacity(input.len() / 2);
        let mut pending: Option<u8> = None;

        for &byte in input {
            match byte {
                b'>' => break,
                b if b.is_ascii_whitespace() => continue,
                b if b.is_ascii_hexdigit() => {
                    let digit = (b as char).to_digit(16).unwrap_or(0) as u8;
                    match pending.take() {
                        Some(hi) => output.push((hi << 4) | digit),
                        None => pending = Some(digit),
                    }
                },
                other => {
                    return Err(Error::Decode(format!(
                        "ASCIIHexDecode: invalid character 0x{:02X}",
                        other
                    )))
                },
            }
        }

        if let Some(hi) = pending {
            output.push(hi << 4);
        }

        Ok(output)
    }

    fn name(&self) -> &str {
        "ASCIIHexDecode"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_decode_basic() {
        assert_eq!(AsciiHexDecoder.decode(b"48656C6C6F>").unwrap(), b"Hello");
    }

    #[test]
    fn test_hex_decode_whitespace_and_odd() {
        assert_eq!(AsciiHexDecoder.decode(b"48 65 6C 6C 6F 2>").unwrap(), b"Hello ");
    }

    #[test]
    fn test_hex_decode_invalid_char() {
        assert!(AsciiHexDecoder.decode(b"48ZZ>").is_err());
    }
}
