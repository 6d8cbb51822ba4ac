//! Shared tuning constants.

/// Workers spawned per logical CPU when the caller leaves the count unset.
pub const WORKERS_PER_CPU: usize = 2;

/// Buffer size used when scanning a wordlist for line breaks.
pub const COUNT_BUFFER_SIZE: usize = 64 * 1024;

/// Buffer size used when hashing a wordlist for its session fingerprint.
pub const FINGERPRINT_BUFFER_SIZE: usize = 1024 * 1024;

/// Default interval between progress reports, in milliseconds.
pub const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 1_000;

/// Version written into session files.
pub const SESSION_VERSION: u32 = 1;
