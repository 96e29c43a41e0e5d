//! Streaming CRC-16-CCITT (poly 0x1021), computed without a table.

/// Seed value for a fresh checksum.
pub const SEED: u16 = 0xFFFF;

/// Fold `bytes` into a running CRC value.
///
/// Folding a span in one call is identical to folding it across several
/// calls over consecutive sub-ranges, so headers can go in byte-by-byte
/// while payloads go in as whole blocks.
pub fn update(mut crc: u16, bytes: &[u8]) -> u16 {
    for &b in bytes {
        let x = (crc >> 8) as u8 ^ b;
        let x = x ^ (x >> 4);
        crc = (crc << 8) ^ ((x as u16) << 12) ^ ((x as u16) << 5) ^ (x as u16);
    }
    crc
}

/// A restartable streaming CRC digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Crc16(u16);

impl Crc16 {
    /// Create a digest seeded with [SEED].
    pub fn new() -> Self {
        Self(SEED)
    }

    /// Fold more bytes into the digest.
    pub fn update(&mut self, bytes: &[u8]) {
        self.0 = update(self.0, bytes);
    }

    /// Restart the digest as if freshly created.
    pub fn reset(&mut self) {
        self.0 = SEED;
    }

    /// Current checksum value.
    pub fn value(&self) -> u16 {
        self.0
    }
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use quickcheck_macros::quickcheck;

    #[test]
    fn ibm_3740_check_value() {
        // the classic "123456789" check value for CRC-16/IBM-3740
        assert_eq!(update(SEED, b"123456789"), 0x29b1);
    }

    #[quickcheck]
    fn matches_crc_crate(data: Vec<u8>) -> bool {
        let reference = crc::Crc::<u16>::new(&crc::CRC_16_IBM_3740);
        update(SEED, &data) == reference.checksum(&data)
    }

    #[quickcheck]
    fn split_fold(data: Vec<u8>, at: usize) -> bool {
        let at = at % (data.len() + 1);
        let (head, tail) = data.split_at(at);
        update(update(SEED, head), tail) == update(SEED, &data)
    }

    #[quickcheck]
    fn digest_matches_free_function(chunks: Vec<Vec<u8>>) -> bool {
        let mut digest = Crc16::new();
        let mut flat = Vec::new();
        for chunk in &chunks {
            digest.update(chunk);
            flat.extend_from_slice(chunk);
        }
        digest.value() == update(SEED, &flat)
    }

    #[test]
    fn reset_reseeds() {
        let mut digest = Crc16::new();
        digest.update(b"stale");
        digest.reset();
        assert_eq!(digest.value(), SEED);
    }
}
