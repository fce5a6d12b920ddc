//! Testing utilities and mock implementations
//!
//! Mock object store and scripted agent executors so the orchestrator,
//! billing gate and API layer can be exercised without a storage backend.

pub mod mocks;

pub use mocks::*;
