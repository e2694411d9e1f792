//! PNG and TIFF predictor reversal for PDF stream decoding.
//!
//! Xref streams and flate-compressed data commonly use PNG predictors
//! (10-15) to improve compression; each row carries a tag byte naming the
//! per-row algorithm.

use crate::error::{Error, Result};

/// Decode parameters for stream decoders.
#[derive(Debug, Clone)]
pub struct DecodeParams {
    /// Predictor algorithm (1 = none, 2 = TIFF, 10-15 = PNG)
    pub predictor: i64,
    /// Number of columns (width in samples)
    pub columns: usize,
    /// Number of color components per sample (default 1)
    pub colors: usize,
    /// Bits per component (default 8)
    pub bits_per_component: usize,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            columns: 1,
            colors: 1,
            bits_per_component: 8,
        }
    }
}

impl DecodeParams {
    /// Bytes of pixel data per row, excluding any predictor tag byte.
    fn pixel_bytes_per_row(&self) -> usize {
        (self.columns * self.colors * self.bits_per_component + 7) / 8
    }

    /// Bytes per row as stored, including the PNG predictor tag byte.
    fn stored_bytes_per_row(&self) -> usize {
        if self.predictor >= 10 {
            self.pixel_bytes_per_row() + 1
        } else {
            self.pixel_bytes_per_row()
        }
    }
}

/// Reverse the predictor encoding described by `params`.
pub fn decode_predictor(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    match params.predictor {
        1 => Ok(data.to_vec()),
        2 => decode_tiff_predictor(data, params),
        10..=15 => decode_png_predictor(data, params),
        other => Err(Error::Decode(format!("Unsupported predictor: {}", other))),
    }
}

/// TIFF predictor 2: each sample is a delta from its left neighbor.
fn decode_tiff_predictor(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    let bytes_per_row = params.pixel_bytes_per_row();
    let colors = params.colors;

    if bytes_per_row == 0 || data.len() % bytes_per_row != 0 {
        return Err(Error::Decode(format!(
            "Predictor: data length {} is not a multiple of row size {}",
            data.len(),
            bytes_per_row
        )));
    }

    let mut output = Vec::with_capacity(data.len());
    for row_data in data.chunks(bytes_per_row) {
        let row_start = output.len();
        for (i, &byte) in row_data.iter().enumerate() {
            if i < colors {
                output.push(byte);
            } else {
                let left = output[row_start + i - colors];
                output.push(byte.wrapping_add(left));
            }
        }
    }

    Ok(output)
}

/// PNG predictors 10-15; every stored row leads with its filter tag.
fn decode_png_predictor(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    let stored = params.stored_bytes_per_row();
    let pixel_bytes = params.pixel_bytes_per_row();

    if stored == 0 || data.len() % stored != 0 {
        return Err(Error::Decode(format!(
            "Predictor: data length {} is not a multiple of row size {}",
            data.len(),
            stored
        )));
    }

    let row_count = data.len() / stored;
    let bpp = ((params.colors * params.bits_per_component) + 7) / 8;
    let mut output: Vec<u8> = Vec::with_capacity(row_count * pixel_bytes);

    for row_idx in 0..row_count {
        let row = &data[row_idx * stored..(row_idx + 1) * stored];
        let tag = row[0];
        let encoded = &row[1..];
        let row_start = output.len();

        for (i, &byte) in encoded.iter().enumerate() {
            let left = if i >= bpp { output[row_start + i - bpp] } else { 0 };
            let up = if row_idx > 0 {
                output[row_start - pixel_bytes + i]
            } else {
                0
            };
            let up_left = if row_idx > 0 && i >= bpp {
                output[row_start - pixel_bytes + i - bpp]
            } else {
                0
            };

            let reconstructed = match tag {
                0 => byte,
                1 => byte.wrapping_add(left),
                2 => byte.wrapping_add(up),
                3 => byte.wrapping_add(((left as u16 + up as u16) / 2) as u8),
                4 => byte.wrapping_add(paeth(left, up, up_left)),
                other => {
                    return Err(Error::Decode(format!("Invalid PNG predictor tag: {}", other)))
                },
            };
            output.push(reconstructed);
        }
    }

    Ok(output)
}

/// Paeth filter function from the PNG specification.
fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_predictor_passthrough() {
        let params = DecodeParams::default();
        assert_eq!(decode_predictor(b"abc", &params).unwrap(), b"abc");
    }

    #[test]
    fn test_png_up_predictor() {
        // Two rows of 3 columns, predictor Up: second row is deltas from first
        let params = DecodeParams {
            predictor: 12,
            columns: 3,
            colors: 1,
            bits_per_component: 8,
        };
        let data = [2u8, 10, 20, 30, 2, 1, 1, 1];
        let decoded = decode_predictor(&data, &params).unwrap();
        assert_eq!(decoded, vec![10, 20, 30, 11, 21, 31]);
    }

    #[test]
    fn test_png_sub_predictor() {
        let params = DecodeParams {
            predictor: 11,
            columns: 3,
            colors: 1,
            bits_per_component: 8,
        };
        let data = [1u8, 5, 5, 5];
        let decoded = decode_predictor(&data, &params).unwrap();
        assert_eq!(decoded, vec![5, 10, 15]);
    }

    #[test]
    fn test_tiff_predictor() {
        let params = DecodeParams {
            predictor: 2,
            columns: 3,
            colors: 1,
            bits_per_component: 8,
        };
        let decoded = decode_predictor(&[5u8, 5, 5], &params).unwrap();
        assert_eq!(decoded, vec![5, 10, 15]);
    }

    #[test]
    fn test_bad_row_size_rejected() {
        let params = DecodeParams {
            predictor: 12,
            columns: 3,
            colors: 1,
            bits_per_component: 8,
        };
        assert!(decode_predictor(&[0u8; 7], &params).is_err());
    }
}
