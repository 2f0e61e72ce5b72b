//! # testman - Fixtures, Plugins and Suites for Rust Tests
//!
//! Per-test fixture construction and lifecycle orchestration on top of a host
//! test runtime.
//!
//! ## Architecture Overview
//!
//! - **Fixture Constructor** (`fixture`): builds a fresh context graph for
//!   every test, threading the parent test's graph down as template
//! - **Plugin Registry** (`plugin`): collects plugins from a constructed graph
//!   and merges their operation interceptors and lifecycle hooks
//! - **Suite Runner** (`suite`): BeforeAll / BeforeEach / AfterEach / AfterAll
//!   around registered tests, parallel tests included
//! - **Host runtime** (`host`, `harness`): the unit primitives testman relies
//!   on, and an in-process implementation for `cargo test`
//!
//! ## Quick Start
//!
//! ```rust
//! use testman::prelude::*;
//!
//! struct Ctx {
//!     t: T,
//!     hits: u32,
//! }
//!
//! fixture!(Ctx { t, hits });
//!
//! impl AsRef<T> for Ctx {
//!     fn as_ref(&self) -> &T {
//!         &self.t
//!     }
//! }
//!
//! #[derive(Clone, Default)]
//! struct CounterSuite;
//!
//! impl CounterSuite {
//!     fn test_starts_at_zero(&mut self, ctx: &Ctx) {
//!         if ctx.hits != 0 {
//!             ctx.t.fatal("fresh context expected");
//!         }
//!     }
//! }
//!
//! impl Suite<Ctx> for CounterSuite {
//!     fn tests() -> Vec<SuiteTest<Self, Ctx>> {
//!         suite_tests!(CounterSuite => test_starts_at_zero)
//!     }
//! }
//!
//! Harness::new()
//!     .run_suite::<CounterSuite, Ctx>("CounterSuite", &Options::new())
//!     .assert_passed();
//! ```
//!
//! ## Configuration
//!
//! The built-in harness reads `TESTMAN_TIMEOUT`, `TESTMAN_VERBOSE`,
//! `TESTMAN_TEMP_ROOT` and `TESTMAN_REPORT_DIR`, optionally on top of a YAML
//! file named by `TESTMAN_CONFIG`. See [`HarnessConfig`].

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Harness configuration
pub mod config;

/// Test context and its intercepted operations
pub mod context;

/// Structural errors
pub mod error;

/// Per-test fixture construction
pub mod fixture;

/// Built-in in-process host runtime
pub mod harness;

/// Host runtime surface
pub mod host;

/// Plugin collection and merging
pub mod plugin;

/// Suite discovery and orchestration
pub mod suite;

pub use config::HarnessConfig;
pub use context::{strip_wrapper, Context, T};
pub use error::{ConfigError, ConstructError, DiscoveryError};
pub use fixture::{construct, Fixture, New};
pub use harness::{Harness, Outcome, Report};
pub use host::{CancelToken, HostTest};
pub use plugin::{Hooks, Lifecycle, MaxDepth, Options, Overrides, Plugin};
pub use suite::{discover, run, suite, Suite, SuiteTest};

/// Name of the synthetic unit that groups a suite's tests
pub const WRAPPER_TEST_NAME: &str = "!";

/// Prefix every registered suite test name must start with
pub const TEST_PREFIX: &str = "test";

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Everything a suite author usually needs
pub mod prelude {
    pub use crate::{
        construct, fixture, run, suite, suite_tests, Context, Fixture, Harness, Hooks, Lifecycle,
        New, Options, Overrides, Plugin, Suite, SuiteTest, T,
    };
}
