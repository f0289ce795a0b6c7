//! Root of the `runbox-core` library.

// Prevent accidental direct writes to stdout/stderr in library code. All
// diagnostics must go through the tracing stack.
#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod error;
pub mod exec;
pub mod languages;
pub mod pool;
pub mod sandbox;
pub mod stream;

pub use error::Result;
pub use error::RunnerErr;
pub use pool::BoxPool;
pub use sandbox::BoxId;
pub use sandbox::IsolateDriver;
pub use sandbox::SandboxDriver;
