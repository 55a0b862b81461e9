#![allow(clippy::uninlined_format_args)]

pub mod clock;
pub mod context;
pub mod rate_limit;
pub mod single_flight;
pub mod storage;
pub mod telemetry;

// the test version of init_tracing does not take a config
// since config itself is tested and modified from different parallel tests
// therefore, this only uses the default tracing settings
// it's not gated out because it is used in integration tests as well
pub fn init_tracing_tests() {
    use std::sync::LazyLock;

    // extra complexity of race conditions across threads,
    // so we use a Mutex to ensure we only initialize once globally
    static INIT: LazyLock<std::sync::Mutex<bool>> = LazyLock::new(|| std::sync::Mutex::new(false));

    let mut init = INIT.lock().unwrap();

    if !*init {
        *init = true;

        tracing_subscriber::fmt::init();
        tracing::debug!("Tracing initialized for tests");
    }
}
