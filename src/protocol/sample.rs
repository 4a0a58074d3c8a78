//! Sample extraction from data item bodies.
//!
//! The session stores raw data item bodies. This is the reading side: it
//! turns a stored body, or a whole sample file, back into sample values.

use crate::error::FrameError;

/// Converts a data item body into signed samples.
///
/// Samples are little-endian and `sample_bits` wide (8, 16, 24 or 32).
/// Narrow samples are sign extended. A trailing partial sample is ignored.
///
/// # Errors
///
/// Returns [`FrameError::InvalidSampleSize`] for any other width.
pub fn decode_samples(sample_bits: u16, body: &[u8]) -> Result<Vec<i32>, FrameError> {
    let width = match sample_bits {
        8 | 16 | 24 | 32 => usize::from(sample_bits / 8),
        other => return Err(FrameError::InvalidSampleSize(other)),
    };
    let shift = 32 - u32::from(sample_bits);

    Ok(body
        .chunks_exact(width)
        .map(|chunk| {
            let mut raw = [0u8; 4];
            raw[..width].copy_from_slice(chunk);
            // Move the sign bit to bit 31, then shift back arithmetically.
            (i32::from_le_bytes(raw) << shift) >> shift
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_16_bit_samples() {
        let samples = decode_samples(16, &[0x00, 0x01, 0x00, 0x02]).unwrap();
        assert_eq!(samples, vec![0x0100, 0x0200]);
    }

    #[test]
    fn test_sign_extension() {
        assert_eq!(decode_samples(8, &[0xFF, 0x7F]).unwrap(), vec![-1, 127]);
        assert_eq!(decode_samples(16, &[0x00, 0x80]).unwrap(), vec![-32768]);
        assert_eq!(
            decode_samples(24, &[0xFE, 0xFF, 0xFF, 0x01, 0x00, 0x00]).unwrap(),
            vec![-2, 1]
        );
        assert_eq!(
            decode_samples(32, &[0xFF, 0xFF, 0xFF, 0xFF]).unwrap(),
            vec![-1]
        );
    }

    #[test]
    fn test_partial_sample_ignored() {
        let samples = decode_samples(16, &[0x01, 0x00, 0x02]).unwrap();
        assert_eq!(samples, vec![1]);
    }

    #[test]
    fn test_invalid_width() {
        assert_eq!(
            decode_samples(12, &[0x00, 0x00]).unwrap_err(),
            FrameError::InvalidSampleSize(12)
        );
    }
}
