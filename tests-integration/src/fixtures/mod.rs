//! Test fixtures for integration testing

mod storage_context;

pub use storage_context::StorageTestContext;
