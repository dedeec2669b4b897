//! Register decoding.
//!
//! A 32-bit float occupies two consecutive 16-bit holding registers. The
//! decoder uses one fixed convention regardless of host byte order: each
//! word contributes its little-endian bytes, first word first, and the four
//! bytes are read as a little-endian IEEE-754 single. In register terms the
//! first word holds the low half of the value ("CDAB" word order), so
//! `[0x0000, 0x3F80]` decodes to `1.0`.
//!
//! No range checking is done: NaN and infinity bit patterns pass through.

use crate::error::DecodeError;

/// Combine one register pair into a float.
pub fn pair_to_f32(first: u16, second: u16) -> f32 {
    let [b0, b1] = first.to_le_bytes();
    let [b2, b3] = second.to_le_bytes();
    f32::from_le_bytes([b0, b1, b2, b3])
}

/// Decode register words into floats, two words per value.
///
/// The returned iterator is lazy and yields one item per complete pair, in
/// order. A trailing unpaired word yields a single [`DecodeError`] and no
/// value.
pub fn decode_f32(words: &[u16]) -> impl Iterator<Item = Result<f32, DecodeError>> + '_ {
    words
        .chunks(2)
        .enumerate()
        .map(|(pair, chunk)| match chunk.get(1) {
            Some(&second) => Ok(pair_to_f32(chunk[0], second)),
            None => Err(DecodeError::UnpairedRegister {
                index: pair * 2,
                word: chunk[0],
            }),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_one() {
        let values: Vec<_> = decode_f32(&[0x0000, 0x3F80]).collect();
        assert_eq!(values, vec![Ok(1.0)]);
    }

    #[test]
    fn test_decode_matches_bit_layout() {
        // 123.456 = 0x42F6E979
        let words = [0xE979, 0x42F6, 0x0000, 0xC120];
        let values: Vec<f32> = decode_f32(&words).map(Result::unwrap).collect();
        assert_eq!(values.len(), 2);
        assert_eq!(values[0].to_bits(), 0x42F6_E979);
        assert_eq!(values[1], -10.0);
    }

    #[test]
    fn test_decode_unpaired_remainder() {
        let results: Vec<_> = decode_f32(&[0x0000, 0x3F80, 0xBEEF]).collect();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0], Ok(1.0));
        assert_eq!(
            results[1],
            Err(DecodeError::UnpairedRegister {
                index: 2,
                word: 0xBEEF
            })
        );
    }

    #[test]
    fn test_decode_single_word() {
        let results: Vec<_> = decode_f32(&[0x1234]).collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[test]
    fn test_decode_empty() {
        assert_eq!(decode_f32(&[]).count(), 0);
    }

    #[test]
    fn test_decode_passes_through_special_values() {
        let nan: Vec<_> = decode_f32(&[0x0001, 0x7FC0]).collect();
        assert!(nan[0].as_ref().unwrap().is_nan());

        let inf: Vec<_> = decode_f32(&[0x0000, 0x7F80]).collect();
        assert_eq!(inf[0], Ok(f32::INFINITY));

        let neg_inf: Vec<_> = decode_f32(&[0x0000, 0xFF80]).collect();
        assert_eq!(neg_inf[0], Ok(f32::NEG_INFINITY));
    }

    #[test]
    fn test_decode_deterministic() {
        let words: Vec<u16> = (0..64u16).map(|i| i.wrapping_mul(0x9E37)).collect();
        let first: Vec<u32> = decode_f32(&words).map(|v| v.unwrap().to_bits()).collect();
        let second: Vec<u32> = decode_f32(&words).map(|v| v.unwrap().to_bits()).collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 32);
    }

    #[test]
    fn test_decode_is_lazy() {
        let words = [0x0000, 0x3F80, 0x0000, 0x4000];
        let mut iter = decode_f32(&words);
        assert_eq!(iter.next(), Some(Ok(1.0)));
        assert_eq!(iter.next(), Some(Ok(2.0)));
        assert_eq!(iter.next(), None);
    }
}
