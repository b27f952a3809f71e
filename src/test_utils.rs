//! Test utilities and global setup

/// Test logging utilities
#[cfg(all(test, feature = "test-logging"))]
pub mod logging {
    use std::sync::Once;
    use tracing_subscriber::{EnvFilter, fmt};

    static INIT: Once = Once::new();

    /// Initialize test logging globally - safe to call multiple times
    ///
    /// Respects `RUST_LOG` and writes through the test writer so output is
    /// captured per test.
    ///
    /// For automatic initialization in a test module:
    /// ```rust
    /// #[cfg(feature = "test-logging")]
    /// #[ctor::ctor]
    /// fn init_test_logging() {
    ///     crate::test_utils::logging::init();
    /// }
    /// ```
    ///
    /// ```bash
    /// RUST_LOG=beef_lsp_client::lsp=trace cargo test --features test-logging
    /// ```
    pub fn init() {
        INIT.call_once(|| {
            let env_filter = EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("debug,tokio=info"));

            fmt()
                .with_env_filter(env_filter)
                .with_test_writer()
                .with_target(true)
                .with_thread_ids(true)
                .compact()
                .try_init()
                .ok(); // Ignore errors if already initialized by another test
        });
    }
}

/// Beef language server executable for integration tests
///
/// Uses `BEEF_LSP_PATH` when set, otherwise `BeefLsp` from `PATH`.
#[cfg(all(test, feature = "beef-integration-tests"))]
pub fn get_test_server_path() -> String {
    std::env::var("BEEF_LSP_PATH").unwrap_or_else(|_| "BeefLsp".to_string())
}
