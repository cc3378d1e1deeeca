use rand::{Rng, rng};

use crate::RandSource;

/// A `RandSource` that uses the thread-local RNG (`rand::rng()`).
///
/// This RNG is fast, cryptographically secure (ChaCha-based), and automatically
/// reseeded periodically.
///
/// ⚠️ NOTE: The underlying `ThreadRng` is not `Send` or `Sync`. This type does
/// not store it; it is a zero-sized handle that reaches for the calling
/// thread's generator on each call, so it may be shared freely.
#[derive(Default, Clone, Copy, Debug)]
pub struct ThreadRandom;

impl RandSource<u16> for ThreadRandom {
    fn rand(&self) -> u16 {
        rng().random()
    }
}
