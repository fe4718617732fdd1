use std::fs::File;
use std::io::Read;

use rand_chacha::ChaCha20Rng;
use rand_core::SeedableRng;

use crate::error::Error;

/// RNG for victim placement and eviction set contents. A configured seed
/// makes sessions reproducible; otherwise 32 bytes of /dev/urandom are used.
pub fn session_rng(seed: Option<u64>) -> Result<ChaCha20Rng, Error> {
    match seed {
        Some(s) => Ok(ChaCha20Rng::seed_from_u64(s)),
        None => {
            let mut key = [0u8; 32];
            File::open("/dev/urandom")?.read_exact(&mut key)?;
            Ok(ChaCha20Rng::from_seed(key))
        }
    }
}
