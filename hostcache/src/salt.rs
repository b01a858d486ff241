//! Hash salt sources.

/// Source of hash salts.
///
/// The salt keeps remote peers from steering many destinations into one
/// bucket, so production sources must be unpredictable.
pub trait SaltSource: Send + Sync {
    /// Draw a new salt.
    fn next_salt(&self) -> u64;
}

/// Salts from the thread-local CSPRNG of `rand`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngSalt;

impl SaltSource for ThreadRngSalt {
    fn next_salt(&self) -> u64 {
        rand::random()
    }
}

/// Always the same salt. For reproducible bucket placement in tests and
/// benchmarks.
#[derive(Debug, Clone, Copy)]
pub struct FixedSalt(pub u64);

impl SaltSource for FixedSalt {
    fn next_salt(&self) -> u64 {
        self.0
    }
}
