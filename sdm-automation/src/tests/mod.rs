mod fake;
mod popup_tests;
mod workflow_tests;

// Opt-in tracing for debugging a failing scenario: `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
