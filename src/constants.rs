pub const MEBIBYTE: u64 = 1024 * 1024;

pub const DEFAULT_CONCURRENCY: usize = 3;

/// Backoff cap: per-attempt wait is min(MAX_RETRY_DELAY_SECS, 2^failures).
pub const MAX_RETRY_DELAY_SECS: u64 = 300;

/// Hard timeout for any single HTTP request.
pub const HTTP_TIMEOUT_SECS: u64 = 120;

pub const SESSION_KEY: &str = "session";

pub const PART_HASH_PREFIX: &str = "state_";
pub const PART_HASH_SUFFIX: &str = ".parthash";
