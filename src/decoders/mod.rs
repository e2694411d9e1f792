//! Stream decoder implementations for PDF filters.
//!
//! Decoders for the filters this crate needs to read real-world AcroForm
//! documents:
//! - FlateDecode (zlib/deflate) - most common
//! - LZWDecode - LZW compression
//! - ASCIIHexDecode / ASCII85Decode - text encodings
//! - RunLengthDecode - run-length encoding
//!
//! Decoders chain in a filter pipeline; PNG/TIFF predictors are applied
//! after the last filter.

use crate::error::{Error, Result};

mod ascii85;
mod ascii_hex;
mod flate;
mod lzw;
mod predictor;
mod runlength;

pub use ascii85::Ascii85Decoder;
pub use ascii_hex::AsciiHexDecoder;
pub use flate::FlateDecoder;
pub use lzw::LzwDecoder;
pub use predictor::{decode_predictor, DecodeParams};
pub use runlength::RunLengthDecoder;

/// Decompression bomb limits.
///
/// The PDF spec sets no limits; these bound memory for hostile inputs.
const MAX_DECOMPRESSION_RATIO: u64 = 100;
const MAX_DECOMPRESSED_SIZE: usize = 100 * 1024 * 1024;

/// Trait for PDF stream decoders.
pub trait StreamDecoder {
    /// Decode the input data.
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Get the name of this decoder (e.g., "FlateDecode").
    fn name(&self) -> &str;
}

/// Decode stream data using a filter pipeline.
///
/// Filters are applied in order; the optional predictor parameters apply
/// after the last filter. Ratio and size limits guard against
/// decompression bombs.
pub fn decode_stream_with_params(
    data: &[u8],
    filters: &[String],
    params: Option<&DecodeParams>,
) -> Result<Vec<u8>> {
    let compressed_size = data.len();
    let mut current = data.to_vec();

    for filter_name in filters {
        let decoder: Box<dyn StreamDecoder> = match filter_name.as_str() {
            "FlateDecode" | "Fl" => Box::new(FlateDecoder),
            "ASCIIHexDecode" | "AHx" => Box::new(AsciiHexDecoder),
            "ASCII85Decode" | "A85" => Box::new(Ascii85Decoder),
            "LZWDecode" | "LZW" => Box::new(LzwDecoder),
            "RunLengthDecode" | "RL" => Box::new(RunLengthDecoder),
            _ => return Err(Error::UnsupportedFilter(filter_name.clone())),
        };

        current = decoder.decode(&current)?;

        if compressed_size > 0 {
            let ratio = current.len() as u64 / compressed_size.max(1) as u64;
            if ratio > MAX_DECOMPRESSION_RATIO {
                return Err(Error::Decode(format!(
                    "Decompression bomb detected: ratio {}:1 exceeds limit {}:1",
                    ratio, MAX_DECOMPRESSION_RATIO
                )));
            }
        }
        if current.len() > MAX_DECOMPRESSED_SIZE {
            return Err(Error::Decode(format!(
                "Decompression bomb detected: {} bytes exceeds limit {} bytes",
                current.len(),
                MAX_DECOMPRESSED_SIZE
            )));
        }
    }

    if let Some(params) = params {
        if params.predictor != 1 {
            current = decode_predictor(&current, params)?;
        }
    }

    Ok(current)
}
