//! In-place endian swapping over strided sample runs.

use crate::sample::SampleType;

/// Reverses the `word_size` bytes of `count` words spaced `stride` bytes
/// apart, starting at the beginning of `buf`.
///
/// `word_size` must be 2, 4 or 8; single-byte data never reaches the
/// swapper. Applying the same call twice restores the original bytes.
pub fn swap_words(buf: &mut [u8], word_size: usize, count: usize, stride: usize) {
    debug_assert!(matches!(word_size, 2 | 4 | 8));
    for i in 0..count {
        let start = i * stride;
        buf[start..start + word_size].reverse();
    }
}

/// Swaps the two components of `count` complex words independently: the
/// real half at each word start and the imaginary half `component_size`
/// bytes further in.
pub fn swap_complex_words(buf: &mut [u8], component_size: usize, count: usize, stride: usize) {
    swap_words(buf, component_size, count, stride);
    swap_words(&mut buf[component_size..], component_size, count, stride);
}

/// Byte-swaps `count` samples of type `sample_type` spaced `stride` bytes
/// apart. Single-byte samples are left untouched.
pub(crate) fn swap_samples(buf: &mut [u8], sample_type: SampleType, count: usize, stride: usize) {
    if sample_type.size() == 1 {
        return;
    }
    if sample_type.is_complex() {
        swap_complex_words(buf, sample_type.component_size(), count, stride);
    } else {
        swap_words(buf, sample_type.size(), count, stride);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swaps_packed_u16() {
        let mut buf = vec![0x12, 0x34, 0x56, 0x78];
        swap_words(&mut buf, 2, 2, 2);
        assert_eq!(buf, [0x34, 0x12, 0x78, 0x56]);
    }

    #[test]
    fn swaps_strided_u32() {
        // Two u32 words separated by a 2-byte gap.
        let mut buf = vec![1, 2, 3, 4, 0xAA, 0xBB, 5, 6, 7, 8];
        swap_words(&mut buf, 4, 2, 6);
        assert_eq!(buf, [4, 3, 2, 1, 0xAA, 0xBB, 8, 7, 6, 5]);
    }

    #[test]
    fn complex_halves_swap_independently() {
        let mut buf = vec![1, 2, 3, 4];
        swap_complex_words(&mut buf, 2, 1, 4);
        assert_eq!(buf, [2, 1, 4, 3]);
    }

    #[test]
    fn involution() {
        let original: Vec<u8> = (0u8..48).collect();
        for (word, stride) in [(2usize, 2usize), (2, 6), (4, 4), (4, 12), (8, 8), (8, 16)] {
            let count = original.len() / stride;
            let mut buf = original.clone();
            swap_words(&mut buf, word, count, stride);
            swap_words(&mut buf, word, count, stride);
            assert_eq!(buf, original, "word={word} stride={stride}");
        }
    }

    #[test]
    fn single_byte_samples_untouched() {
        let mut buf = vec![9, 8, 7];
        swap_samples(&mut buf, SampleType::U8, 3, 1);
        assert_eq!(buf, [9, 8, 7]);
    }
}
