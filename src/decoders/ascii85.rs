//! ASCII85Decode implementation.
//!
//! Groups of five characters in `!`..`u` encode four bytes base-85;
//! `z` is shorthand for four zero bytes; `~>` marks EOD.

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};

/// ASCII85Decode filter implementation.
pub struct Ascii85Decoder;

impl StreamDecoder for Ascii85Decoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        let mut group = [0u8; 5];
        let mut count = 0;

        for &byte in input {
            match byte {
                b'~' => break,
                b'z' => {
                    if count != 0 {
                        return Err(Error::Decode(
                            "ASCII85Decode: 'z' inside a group".to_string(),
                        ));
                    }
                    output.extend_from_slice(&[0, 0, 0, 0]);
                },
                b'!'..=b'u' => {
                    group[count] = byte - b'!';
                    count += 1;
                    if count == 5 {
                        push_group(&group, 5, &mut output)?;
                        count = 0;
                    }
                },
                b if b.is_ascii_whitespace() => {},
                other => {
                    return Err(Error::Decode(format!(
                        "ASCII85Decode: invalid character 0x{:02X}",
                        other
                    )))
                },
            }
        }

        // Partial final group: pad with 'u' and keep count-1 bytes
        if count > 0 {
            if count == 1 {
                return Err(Error::Decode(
                    "ASCII85Decode: single trailing character".to_string(),
                ));
            }
            let mut padded = group;
            for slot in padded.iter_mut().skip(count) {
                *slot = 84;
            }
            push_group(&padded, count, &mut output)?;
        }

        Ok(output)
    }

    fn name(&self) -> &str {
        "ASCII85Decode"
    }
}

/// Decode one 5-character group, emitting `count - 1` bytes.
fn push_group(group: &[u8; 5], count: usize, output: &mut Vec<u8>) -> Result<()> {
    let mut acc: u32 = 0;
    for &digit in group {
        acc = acc
            .checked_mul(85)
            .and_then(|v| v.checked_add(digit as u32))
            .ok_or_else(|| Error::Decode("ASCII85Decode: group overflow".to_string()))?;
    }
    output.extend_from_slice(&acc.to_be_bytes()[..count - 1]);
    Ok(())
}
