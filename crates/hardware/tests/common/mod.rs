//! Shared test infrastructure for the LSU scenario tests.

pub mod mocks;

use lsu_core::config::LsuConfig;
use lsu_core::core::bounds::BoundsPolicy;
use lsu_core::sim::TestBench;

/// A small, fast configuration used by most scenario tests.
pub fn test_config() -> LsuConfig {
    let mut config = LsuConfig::default();
    config.queues.ldq_entries = 8;
    config.queues.stq_entries = 8;
    config.queues.mcq_entries = 8;
    config.queues.bdq_entries = 4;
    config.dcache.latency = 1;
    config
}

/// Builds a bench over `test_config` with the default bounds policy.
pub fn bench() -> TestBench {
    let _ = env_logger::builder().is_test(true).try_init();
    TestBench::new(&test_config())
}

/// Builds a bench with an injected bounds policy.
pub fn bench_with_policy(policy: Box<dyn BoundsPolicy>) -> TestBench {
    let _ = env_logger::builder().is_test(true).try_init();
    TestBench::with_policy(&test_config(), policy)
}
