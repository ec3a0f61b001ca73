// Bit-field extraction for packed argument words.

use crate::Stream::Structs::ParseError;

/// `width` bits of `word` starting at bit `shift`.
#[inline]
pub const fn bits(word: u32, shift: u32, width: u32) -> u32 {
    if width >= 32 {
        word >> shift
    } else {
        (word >> shift) & ((1 << width) - 1)
    }
}

/// Reject `word` if any bit outside `used` is set.
#[inline]
pub fn reserved_clear(word: u32, used: u32) -> Result<(), ParseError> {
    if word & !used != 0 {
        return Err(ParseError::InvalidArguments);
    }
    Ok(())
}

/// Reinterpret a word as an `f32`, rejecting NaN and infinities.
#[inline]
pub fn finite_f32(word: u32) -> Result<f32, ParseError> {
    let v = f32::from_bits(word);
    if v.is_finite() {
        Ok(v)
    } else {
        Err(ParseError::InvalidArguments)
    }
}

/// `offset + size` as `u32`, rejecting overflow.
#[inline]
pub fn checked_end(offset: u32, size: u32) -> Result<u32, ParseError> {
    offset.checked_add(size).ok_or(ParseError::InvalidArguments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_extracts_fields() {
        let word = 0b1_0000_0011 | (0x2A << 16);
        assert_eq!(bits(word, 0, 8), 3);
        assert_eq!(bits(word, 8, 1), 1);
        assert_eq!(bits(word, 16, 8), 0x2A);
        assert_eq!(bits(u32::MAX, 0, 32), u32::MAX);
    }

    #[test]
    fn reserved_bits_must_be_zero() {
        assert!(reserved_clear(0x1FF, 0x1FF).is_ok());
        assert_eq!(reserved_clear(0x200, 0x1FF), Err(ParseError::InvalidArguments));
    }

    #[test]
    fn non_finite_floats_rejected() {
        assert_eq!(finite_f32(1.5f32.to_bits()), Ok(1.5));
        assert!(finite_f32(f32::NAN.to_bits()).is_err());
        assert!(finite_f32(f32::INFINITY.to_bits()).is_err());
    }

    #[test]
    fn end_overflow_rejected() {
        assert_eq!(checked_end(4, 8), Ok(12));
        assert!(checked_end(u32::MAX, 1).is_err());
    }
}
