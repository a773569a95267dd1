//! Color and descriptor distance helpers.

#[inline]
pub fn absdiff(a: u8, b: u8) -> usize {
    a.abs_diff(b) as usize
}

/// L1 distance summed over channels.
#[inline]
pub fn l1<const C: usize>(a: &[u8; C], b: &[u8; C]) -> usize {
    a.iter().zip(b).map(|(&a, &b)| absdiff(a, b)).sum()
}

#[inline]
pub fn hamming(a: u16, b: u16) -> usize {
    (a ^ b).count_ones() as usize
}

/// Hamming distance summed over per-channel codes.
#[inline]
pub fn hamming_total<const C: usize>(a: &[u16; C], b: &[u16; C]) -> usize {
    a.iter().zip(b).map(|(&a, &b)| hamming(a, b)).sum()
}

#[inline]
pub fn popcount(code: u16) -> usize {
    code.count_ones() as usize
}

/// Distance of `curr` from the line through the origin and `bg`.
///
/// Insensitive to brightness changes that keep the chromaticity, which makes
/// it a shadow/highlight tolerant color distance.
pub fn color_distortion<const C: usize>(curr: &[u8; C], bg: &[u8; C]) -> usize {
    let curr_sqr: f32 = curr.iter().map(|&c| (c as f32) * (c as f32)).sum();
    let bg_sqr: f32 = bg.iter().map(|&c| (c as f32) * (c as f32)).sum();
    if bg_sqr == 0.0 {
        return curr_sqr.sqrt() as usize;
    }
    let dot: f32 = curr
        .iter()
        .zip(bg)
        .map(|(&c, &b)| c as f32 * b as f32)
        .sum();
    (curr_sqr - dot * dot / bg_sqr).max(0.0).sqrt() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_values_have_zero_distance() {
        assert_eq!(absdiff(17, 17), 0);
        assert_eq!(l1(&[1, 2, 3], &[1, 2, 3]), 0);
        assert_eq!(hamming(0xBEEF, 0xBEEF), 0);
        assert_eq!(color_distortion(&[40, 80, 120], &[40, 80, 120]), 0);
    }

    #[test]
    fn l1_and_hamming_sum_channels() {
        assert_eq!(l1(&[0, 10, 255], &[5, 0, 250]), 20);
        assert_eq!(hamming_total(&[0b1011, 0, 0xFFFF], &[0, 0, 0]), 19);
        assert_eq!(popcount(0xF0F0), 8);
    }

    #[test]
    fn distortion_ignores_pure_brightness_scaling() {
        assert_eq!(color_distortion(&[20, 40, 60], &[40, 80, 120]), 0);
        assert!(color_distortion(&[120, 40, 20], &[40, 80, 120]) > 50);
    }

    #[test]
    fn distortion_against_black_is_magnitude() {
        assert_eq!(color_distortion(&[3, 4, 0], &[0, 0, 0]), 5);
    }
}
