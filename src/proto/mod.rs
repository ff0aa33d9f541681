//! Protocol Buffer definitions and generated code for the ingest service.
//!
//! Generated by [`tonic-build`] from `proto/ingest.proto` at build time.

pub mod ingest {
    tonic::include_proto!("ingest");
}
