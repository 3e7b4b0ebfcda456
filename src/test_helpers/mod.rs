//! Shared test utilities.

pub mod fixtures;
pub mod sim;
pub mod sink;
pub mod temp;

/// Route `log` output through the test harness.
pub fn init_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}
