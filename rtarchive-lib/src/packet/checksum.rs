//! Byte summation checksum used by the ground segment for HRD packets.
//!
//! The checked region is the packet body followed by a 4 byte little-endian trailer
//! holding the expected sum.

/// Length of the checksum trailer.
pub const TRAILER_LEN: usize = 4;

const BLOCK_SIZE: usize = 16;

/// Sum, modulo 2^32, of every byte in `body`.
#[must_use]
pub fn sum(body: &[u8]) -> u32 {
    let mut blocks = body.chunks_exact(BLOCK_SIZE);
    let mut sum = 0u32;
    for b in &mut blocks {
        sum = sum
            .wrapping_add(u32::from(b[0]) + u32::from(b[1]) + u32::from(b[2]) + u32::from(b[3]))
            .wrapping_add(u32::from(b[4]) + u32::from(b[5]) + u32::from(b[6]) + u32::from(b[7]))
            .wrapping_add(u32::from(b[8]) + u32::from(b[9]) + u32::from(b[10]) + u32::from(b[11]))
            .wrapping_add(
                u32::from(b[12]) + u32::from(b[13]) + u32::from(b[14]) + u32::from(b[15]),
            );
    }
    for b in blocks.remainder() {
        sum = sum.wrapping_add(u32::from(*b));
    }
    sum
}

/// Result of checking a region against its trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checked {
    pub sum: u32,
    pub expected: u32,
}

impl Checked {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.sum == self.expected
    }
}

/// Compute the sum of `region` minus its trailer and compare it to the trailer.
///
/// Returns `None` if the region cannot even hold a trailer.
#[must_use]
pub fn check(region: &[u8]) -> Option<Checked> {
    if region.len() < TRAILER_LEN {
        return None;
    }
    let (body, trailer) = region.split_at(region.len() - TRAILER_LEN);
    Some(Checked {
        sum: sum(body),
        expected: u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]),
    })
}

/// Returns true if `region` holds a body followed by a matching trailer.
#[must_use]
pub fn verify(region: &[u8]) -> bool {
    check(region).is_some_and(|c| c.is_valid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    fn with_trailer(body: &[u8]) -> Vec<u8> {
        let mut region = body.to_vec();
        region.extend_from_slice(&sum(body).to_le_bytes());
        region
    }

    #[test_case(&[], 0; "empty")]
    #[test_case(&[1, 2, 3], 6; "remainder only")]
    #[test_case(&[0xff; 16], 16 * 255; "one block")]
    #[test_case(&[0xff; 35], 35 * 255; "blocks and remainder")]
    fn sums(body: &[u8], expected: u32) {
        assert_eq!(sum(body), expected);
    }

    #[test]
    fn sum_wraps() {
        // 2^32 / 255 bytes of 0xff overflows a u32
        let body = vec![0xffu8; 16_843_010];
        let expected = (16_843_010u64 * 255 % (1u64 << 32)) as u32;
        assert_eq!(sum(&body), expected);
    }

    #[test]
    fn region_too_short() {
        assert!(check(&[0, 0, 0]).is_none());
        assert!(!verify(&[0, 0, 0]));
        assert!(verify(&[0, 0, 0, 0]));
    }

    #[test]
    fn trailer_is_little_endian() {
        let region = [0x01, 0x02, 0x03, 0x00, 0x00, 0x00, 0x06];
        assert!(!verify(&region));
        let region = [0x01, 0x02, 0x03, 0x06, 0x00, 0x00, 0x00];
        assert!(verify(&region));
    }

    proptest! {
        #[test]
        fn valid_regardless_of_body_order(mut body in proptest::collection::vec(any::<u8>(), 0..200), seed in any::<u64>()) {
            let region = with_trailer(&body);
            prop_assert!(verify(&region));

            // a sum does not care about byte order
            let n = body.len();
            if n > 1 {
                body.rotate_left((seed as usize) % n);
                body.swap(0, n - 1);
            }
            let mut reordered = body.clone();
            reordered.extend_from_slice(&region[n..]);
            prop_assert!(verify(&reordered));
        }

        #[test]
        fn single_byte_mutation_invalidates(body in proptest::collection::vec(any::<u8>(), 1..200), idx in any::<usize>(), delta in 1u8..=255) {
            let mut region = with_trailer(&body);
            let idx = idx % body.len();
            region[idx] = region[idx].wrapping_add(delta);
            prop_assert!(!verify(&region));
        }
    }
}
