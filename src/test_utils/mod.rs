//! Shared helpers for the crate's unit tests: fixture builders, a recording
//! mock transport and an in-process gRPC ingest server.
mod common;
mod mock_ingest;

pub use common::*;
pub use mock_ingest::*;
