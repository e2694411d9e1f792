//! LZWDecode implementation.
//!
//! PDF's LZW variant uses MSB-first bit order, 9-bit initial codes,
//! clear code 256 and EOD 257. The weezl crate implements exactly this
//! profile with an 8-bit minimum code size.

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};

/// LZWDecode filter implementation.
pub struct LzwDecoder;

impl StreamDecoder for LzwDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        use weezl::{decode::Decoder as WeezlDecoder, BitOrder};

        let mut decoder = WeezlDecoder::new(BitOrder::Msb, 8);
        decoder
            .decode(input)
            .map_err(|e| Error::Decode(format!("LZWDecode error: {:?}", e)))
    }

    fn name(&self) -> &str {
        "LZWDecode"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lzw_round_trip() {
        use weezl::{encode::Encoder, BitOrder};

        let original = b"aaaabbbbccccaaaabbbb".to_vec();
        let encoded = Encoder::new(BitOrder::Msb, 8).encode(&original).unwrap();
        let decoded = LzwDecoder.decode(&encoded).unwrap();
        assert_eq!(decoded, original);
    }
}
