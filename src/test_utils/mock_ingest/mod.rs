mod mock_ingest_service;

pub use mock_ingest_service::*;
