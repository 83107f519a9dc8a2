//! Seed to key algorithms used by the security unlock handshake

/// Computes the unlock key for a seed returned by the PCM.
///
/// Algorithms are vendor specific, so this is the seam where callers plug in their own.
pub trait KeyAlgorithm: Send + Sync {
    /// Returns the key for `seed`
    fn get_key(&self, seed: u16) -> u16;
}

/// The GM algorithms known to this crate, selected by number
/// (see [crate::pcm_info::PcmInfo::key_algorithm])
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct GmKeyAlgorithm {
    algorithm: u32,
}

impl GmKeyAlgorithm {
    /// Creates the algorithm with the given number
    pub fn new(algorithm: u32) -> Self {
        Self { algorithm }
    }

    /// Algorithm number
    pub fn algorithm(&self) -> u32 {
        self.algorithm
    }
}

impl KeyAlgorithm for GmKeyAlgorithm {
    fn get_key(&self, seed: u16) -> u16 {
        match self.algorithm {
            // The seed is used exactly as parsed, no byte swap
            1 => 0x934Du16.wrapping_sub(seed),
            _ => 0x0000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algorithm_one() {
        let algo = GmKeyAlgorithm::new(1);
        assert_eq!(algo.get_key(0x1234), 0x934D - 0x1234);
        assert_eq!(algo.get_key(0xFFFF), 0x934E);
    }

    #[test]
    fn unknown_algorithms_yield_zero() {
        assert_eq!(GmKeyAlgorithm::new(2).get_key(0x1234), 0);
        assert_eq!(GmKeyAlgorithm::new(99).get_key(0x1234), 0);
    }
}
