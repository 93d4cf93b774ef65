/// Common test utilities and helpers for integration tests
pub mod fixtures;

pub use fixtures::StorageTestContext;

/// Initialize test logging
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("sweeper=debug,info")
        .with_test_writer()
        .try_init();
}
