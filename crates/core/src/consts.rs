//! Shared constants.

use std::thread::available_parallelism;

pub const PASS_MESSAGE: &str = "success";
pub const FAIL_MESSAGE: &str = "failure";

/// Characters treated as word delimiters by the string case converters.
pub const DEFAULT_DELIMITERS: &str = " -_";

pub const DEFAULT_COMPRESS_LEVEL: u32 = 6;

/// Resource attribute holding the unique instance id of a running service.
pub const SERVICE_INST_ID_KEY: &str = "service.instance.id";

/// Number of process-level workers worth spawning on this host.
#[must_use]
pub fn num_process_workers() -> usize {
    available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}

/// Number of thread-level workers, capped at 32.
#[must_use]
pub fn num_thread_workers() -> usize {
    (num_process_workers() + 4).min(32)
}
