//! FlateDecode (zlib/deflate) implementation.
//!
//! The most common PDF compression filter. Uses the flate2 crate; a raw
//! deflate pass covers generators that omit the zlib wrapper.

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};
use flate2::read::{DeflateDecoder, ZlibDecoder};
use std::io::Read;

/// FlateDecode filter implementation.
pub struct FlateDecoder;

impl StreamDecoder for FlateDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        let mut decoder = ZlibDecoder::new(input);

        match decoder.read_to_end(&mut output) {
            Ok(_) => Ok(output),
            Err(e) => {
                // Partial recovery: truncated streams still carry usable data
                if !output.is_empty() {
                    log::warn!(
                        "FlateDecode partial recovery: {} bytes before corruption: {}",
                        output.len(),
                        e
                    );
                    return Ok(output);
                }

                // Some PDFs carry raw deflate data without the zlib wrapper
                output.clear();
                let mut deflate_decoder = DeflateDecoder::new(input);
                match deflate_decoder.read_to_end(&mut output) {
                    Ok(_) => Ok(output),
                    Err(_) if !output.is_empty() => {
                        log::warn!("FlateDecode raw-deflate partial recovery: {} bytes", output.len());
                        Ok(output)
                    },
                    Err(raw_err) => Err(Error::Decode(format!(
                        "FlateDecode failed: {} (raw deflate: {})",
                        e, raw_err
                    ))),
                }
            },
        }
    }

    fn name(&self) -> &str {
        "FlateDecode"
    }
}
