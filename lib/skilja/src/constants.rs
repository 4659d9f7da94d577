//! Centralized environment variable names and default values for runtime tuning.

// Environment variable names
pub const ENV_KEEP_INTERMEDIATES: &str = "SKILJA_KEEP_INTERMEDIATES";
pub const ENV_LOCAL_TASKS: &str = "SKILJA_LOCAL_TASKS";
pub const ENV_NUM_REDUCERS: &str = "SKILJA_NUM_REDUCERS";
pub const ENV_WRITER_QUEUE_CAP: &str = "SKILJA_WRITER_QUEUE_CAP";
pub const ENV_LOCAL_BATCH_BYTES: &str = "SKILJA_LOCAL_BATCH_BYTES";
pub const ENV_COMBINE_BUFFER_RECORDS: &str = "SKILJA_COMBINE_BUFFER_RECORDS";

// Defaults (picked to keep channel sends and write syscalls amortized under heavy shuffle)
pub const DEFAULT_WRITER_QUEUE_CAP: usize = 8_192;
// Per-partition chunk accumulated in the map task before handing to the writer thread
pub const DEFAULT_LOCAL_BATCH_BYTES: usize = 256 * 1024;
// Buffered (key, value) records per map task before the combiner folds and flushes
pub const DEFAULT_COMBINE_BUFFER_RECORDS: usize = 1 << 18;

// A failed map/shuffle/reduce task is re-run with the same partition this many times in total
pub const MAX_TASK_ATTEMPTS: usize = 3;

// Intermediate shuffle files live under this directory, one subdir per pipeline run
pub const RUNS_ROOT: &str = ".skilja_runs";
