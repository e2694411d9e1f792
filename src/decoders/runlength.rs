//! RunLengthDecode implementation.
//!
//! Length byte 0-127: copy next N+1 bytes literally. Length byte 128: EOD.
//! Length byte 129-255: repeat next byte 257-N times.

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};

/// RunLengthDecode filter implementation.
pub struct RunLengthDecoder;

impl StreamDecoder for RunLengthDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        let mut i = 0;

        while i < input.len() {
            let length = input[i];
            i += 1;

            match length {
                0..=127 => {
                    let count = length as usize + 1;
                    if i + count > input.len() {
                        return Err(Error::Decode(format!(
                            "RunLengthDecode: literal run needs {} bytes, have {}",
                            count,
                            input.len() - i
                        )));
                    }
                    output.extend_from_slice(&input[i..i + count]);
                    i += count;
                },
                128 => break,
                129..=255 => {
                    let count = 257 - length as usize;
                    if i >= input.len() {
                        return Err(Error::Decode(
                            "RunLengthDecode: missing byte for run".to_string(),
                        ));
                    }
                    let byte = input[i];
                    i += 1;
                    output.resize(output.len() + count, byte);
                },
            }
        }

        Ok(output)
    }

    fn name(&self) -> &str {
        "RunLengthDecode"
    }
}
