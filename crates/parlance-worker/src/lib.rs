#![forbid(unsafe_code)]

//! Worker pool draining the job queue.
//!
//! Each worker loops over an atomic claim, runs the decode → gate →
//! transcribe → translate pipeline, and writes the terminal transition.
//! Failures are confined to the job: panics and transient errors never take
//! the pool down.

pub mod pipeline;
pub mod pool;

pub use pipeline::{SNIPPET_MAX_SECONDS, SNIPPET_MAX_WORDS, WorkerConfig, WorkerDeps, process_next};
pub use pool::WorkerPool;
