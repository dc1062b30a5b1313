//! Little-endian field readers shared by the compound file and BIFF8 decoders.
//! Every reader is bounds checked and returns `None` when the slice is too short,
//! so truncated workbooks surface as decode errors instead of panics.

/// Reads a `u16` at `offset`.
#[inline]
pub(crate) fn u16_at(bytes: &[u8], offset: usize) -> Option<u16> {
    let field = bytes.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_le_bytes([field[0], field[1]]))
}

/// Reads a `u32` at `offset`.
#[inline]
pub(crate) fn u32_at(bytes: &[u8], offset: usize) -> Option<u32> {
    let field = bytes.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes(field.try_into().ok()?))
}

/// Reads a `u64` at `offset`.
#[inline]
pub(crate) fn u64_at(bytes: &[u8], offset: usize) -> Option<u64> {
    let field = bytes.get(offset..offset.checked_add(8)?)?;
    Some(u64::from_le_bytes(field.try_into().ok()?))
}

/// Reads an IEEE 754 double at `offset`.
#[inline]
pub(crate) fn f64_at(bytes: &[u8], offset: usize) -> Option<f64> {
    u64_at(bytes, offset).map(f64::from_bits)
}

/// Splits a byte slice into consecutive `u32` values, ignoring a trailing partial word.
pub(crate) fn u32_words(bytes: &[u8]) -> impl ExactSizeIterator<Item = u32> + '_ {
    bytes
        .chunks_exact(4)
        .map(|word| u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_fields_in_little_endian_order() {
        let bytes = [0x34, 0x12, 0x78, 0x56, 0x00, 0x00, 0x00, 0x00, 0xFF];
        assert_eq!(u16_at(&bytes, 0), Some(0x1234));
        assert_eq!(u32_at(&bytes, 0), Some(0x5678_1234));
        assert_eq!(u64_at(&bytes, 0), Some(0x5678_1234));
        assert_eq!(f64_at(&1.5f64.to_le_bytes(), 0), Some(1.5));
    }

    #[test]
    fn short_slices_yield_none() {
        let bytes = [0x01, 0x02, 0x03];
        assert_eq!(u16_at(&bytes, 2), None);
        assert_eq!(u32_at(&bytes, 0), None);
        assert_eq!(u64_at(&bytes, usize::MAX), None);
    }

    #[test]
    fn words_skip_trailing_bytes() {
        let words: Vec<u32> = u32_words(&[1, 0, 0, 0, 2, 0, 0, 0, 9]).collect();
        assert_eq!(words, vec![1, 2]);
    }
}
