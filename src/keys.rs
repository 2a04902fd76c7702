use log::trace;
use rand::distributions::{Alphanumeric, DistString};

pub const KEY_LENGTH: usize = 32;

/// Random alphanumeric key for authenticating against the tracking worker.
///
/// Drawn from the thread-local generator, which is a CSPRNG seeded from the
/// operating system.
pub fn generate_key(length: usize) -> String {
    trace!("Generating random key");

    Alphanumeric.sample_string(&mut rand::thread_rng(), length)
}
