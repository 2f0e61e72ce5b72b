// File: testman/src/harness/mod.rs
//
// Built-in Harness
//
// In-process host runtime: runs a root unit on the calling thread, every
// sub-unit on its own thread, and returns a `Report` of the whole tree. Meant
// to be called from ordinary `#[test]` functions:
//
//     #[test]
//     fn test_database() {
//         Harness::new()
//             .run_suite::<DatabaseSuite, Ctx>("DatabaseSuite", &Options::new())
//             .assert_passed();
//     }

mod node;
/// Outcome trees
pub mod report;

pub use report::{Outcome, Report};

use crate::config::HarnessConfig;
use crate::context::{Context, T};
use crate::plugin::Options;
use crate::suite::Suite;
use node::{Node, Shared};
use std::sync::Arc;
use std::time::SystemTime;

/// Runs root units and collects their reports
#[derive(Debug, Clone, Default)]
pub struct Harness {
    config: HarnessConfig,
}

impl Harness {
    /// Harness configured from the environment.
    ///
    /// An invalid configuration is logged and replaced by the defaults, so a
    /// typo in `TESTMAN_*` never hides the tests themselves.
    pub fn new() -> Self {
        let config = HarnessConfig::from_env().unwrap_or_else(|err| {
            log::warn!("Ignoring invalid harness configuration: {}", err);
            HarnessConfig::default()
        });
        Self { config }
    }

    /// Harness with an explicit configuration
    pub fn with_config(config: HarnessConfig) -> Self {
        Self { config }
    }

    /// Active configuration
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Run `body` as a root unit named `name`
    pub fn run<F>(&self, name: &str, body: F) -> Report
    where
        F: FnOnce(&T),
    {
        let deadline = self
            .config
            .timeout()
            .and_then(|timeout| SystemTime::now().checked_add(timeout));

        let shared = Arc::new(Shared {
            config: self.config.clone(),
            deadline,
        });

        log::debug!("Starting root unit {}", name);
        let root = Node::root(name, shared);
        root.execute(|host| {
            let t = T::new(host, Options::new());
            body(&t);
        });

        let report = root.report();
        log::info!(
            "{}: {} ({} unit(s), {} ms)",
            report.name,
            report.outcome,
            report.count(),
            report.duration_ms
        );

        if let Some(dir) = &self.config.report_dir {
            if let Err(err) = report.save(dir) {
                log::warn!("Failed to save report for {}: {:#}", name, err);
            }
        }

        report
    }

    /// Run suite `S` with context shape `C` as a root unit
    pub fn run_suite<S, C>(&self, name: &str, options: &Options) -> Report
    where
        S: Suite<C>,
        C: Context,
    {
        self.run(name, |t| crate::suite::suite::<S, C>(t, options))
    }
}
