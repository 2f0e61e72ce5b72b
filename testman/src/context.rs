// File: testman/src/context.rs
//
// Test Context
//
// `T` wraps the host's per-test handle and routes every observable operation
// through the installed Intercepted-Operation Table, so plugins see (and may
// alter) naming, logging, failure signalling and resource allocation.

use crate::fixture::{Fixture, New};
use crate::host::{CancelToken, HostTest};
use crate::plugin::{Options, Overrides};
use crate::WRAPPER_TEST_NAME;
use parking_lot::RwLock;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// Handle to the current test.
///
/// Cloning is cheap and every clone shares the same host unit and the same
/// installed operation table.
#[derive(Clone)]
pub struct T {
    inner: Arc<Inner>,
}

struct Inner {
    host: Arc<dyn HostTest>,
    overrides: RwLock<Arc<Overrides>>,
    options: Options,
}

/// A context shape a suite or sub-test can be driven with: any fixture graph
/// that exposes its test handle.
pub trait Context: Fixture + AsRef<T> {}

impl<C: Fixture + AsRef<T>> Context for C {}

impl T {
    /// Wrap a host unit with an empty operation table
    pub fn new(host: Arc<dyn HostTest>, options: Options) -> Self {
        Self {
            inner: Arc::new(Inner {
                host,
                overrides: RwLock::new(Arc::new(Overrides::default())),
                options,
            }),
        }
    }

    /// Underlying host unit
    pub fn host(&self) -> &Arc<dyn HostTest> {
        &self.inner.host
    }

    /// Options this context was constructed with
    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    /// Replace the operation table
    pub fn install(&self, overrides: Overrides) {
        *self.inner.overrides.write() = Arc::new(overrides);
    }

    /// Currently installed operation table
    pub fn overrides(&self) -> Arc<Overrides> {
        // clone out so interceptors may call back into `T` without deadlocking
        self.inner.overrides.read().clone()
    }

    /// Test name, without the internal wrapper segment
    pub fn name(&self) -> String {
        self.overrides()
            .name
            .call(&|()| strip_wrapper(&self.inner.host.name()), ())
    }

    /// Last `/`-separated segment of `name()`
    pub fn base_name(&self) -> String {
        let name = self.name();
        name.rsplit('/').next().unwrap_or_default().to_string()
    }

    /// Declare that this test runs in parallel with its parallel siblings
    pub fn parallel(&self) {
        self.overrides()
            .parallel
            .call(&|()| self.inner.host.parallel(), ());
    }

    /// Change the working directory until the test ends
    pub fn chdir(&self, dir: impl AsRef<Path>) {
        self.overrides().chdir.call(
            &|dir| self.inner.host.chdir(&dir),
            dir.as_ref().to_path_buf(),
        );
    }

    /// Set an environment variable until the test ends
    pub fn setenv(&self, key: &str, value: &str) {
        self.overrides().setenv.call(
            &|(key, value)| self.inner.host.setenv(&key, &value),
            (key.to_string(), value.to_string()),
        );
    }

    /// Fresh directory removed after the test and its sub-tests complete
    pub fn temp_dir(&self) -> PathBuf {
        self.overrides()
            .temp_dir
            .call(&|()| self.inner.host.temp_dir(), ())
    }

    /// Record a line in the test log
    pub fn log(&self, msg: impl fmt::Display) {
        self.overrides()
            .log
            .call(&|msg| self.inner.host.log(&msg), msg.to_string());
    }

    /// Signal cancelled just before the test's cleanups run
    pub fn context(&self) -> CancelToken {
        self.overrides()
            .context
            .call(&|()| self.inner.host.context(), ())
    }

    /// Time at which the run times out, if any
    pub fn deadline(&self) -> Option<SystemTime> {
        self.overrides()
            .deadline
            .call(&|()| self.inner.host.deadline(), ())
    }

    /// `log` followed by `fail`
    pub fn error(&self, msg: impl fmt::Display) {
        self.overrides()
            .error
            .call(&|msg| self.inner.host.error(&msg), msg.to_string());
    }

    /// Mark failed, keep running
    pub fn fail(&self) {
        self.overrides().fail.call(&|()| self.inner.host.fail(), ());
    }

    /// Whether the test has failed
    pub fn failed(&self) -> bool {
        self.overrides()
            .failed
            .call(&|()| self.inner.host.failed(), ())
    }

    /// Mark failed and stop the test
    pub fn fail_now(&self) -> ! {
        self.overrides()
            .fail_now
            .call(&|()| self.inner.host.fail_now(), ());
        self.inner.host.fail_now()
    }

    /// `log` followed by `fail_now`
    pub fn fatal(&self, msg: impl fmt::Display) -> ! {
        self.overrides()
            .fatal
            .call(&|msg| self.inner.host.fatal(&msg), msg.to_string());
        self.inner.host.fail_now()
    }

    /// `log` followed by `skip_now`
    pub fn skip(&self, msg: impl fmt::Display) -> ! {
        self.overrides()
            .skip
            .call(&|msg| self.inner.host.skip(&msg), msg.to_string());
        self.inner.host.skip_now()
    }

    /// Mark skipped and stop the test
    pub fn skip_now(&self) -> ! {
        self.overrides()
            .skip_now
            .call(&|()| self.inner.host.skip_now(), ());
        self.inner.host.skip_now()
    }

    /// Whether the test was skipped
    pub fn skipped(&self) -> bool {
        self.overrides()
            .skipped
            .call(&|()| self.inner.host.skipped(), ())
    }

    /// Register a callback for the test's exit path. Not intercepted.
    pub fn cleanup<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.host.cleanup(Box::new(f));
    }
}

impl fmt::Debug for T {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("T")
            .field("name", &self.inner.host.name())
            .finish()
    }
}

impl AsRef<T> for T {
    fn as_ref(&self) -> &T {
        self
    }
}

// A `T` member of a fixture is the handle of the test being constructed.
impl New for T {
    fn new(t: &T, _parent: Option<&Self>, _options: &Options) -> anyhow::Result<Self> {
        Ok(t.clone())
    }
}

crate::fixture!(new T);

/// Drop the synthetic wrapper unit from a host name.
///
/// `Suite/!/test_a` becomes `test_a`; the wrapper unit itself (`Suite/!`)
/// reports as `Suite`. A wrapper the host renamed to keep sibling names
/// unique (`!#01`) is recognised as well. Names without a wrapper segment are
/// returned unchanged.
pub fn strip_wrapper(name: &str) -> String {
    let marker = name
        .split('/')
        .scan(0usize, |offset, segment| {
            let start = *offset;
            *offset += segment.len() + 1;
            Some((start, segment))
        })
        .find(|(_, segment)| is_wrapper_segment(segment));

    match marker {
        Some((start, segment)) => {
            let rest = start + segment.len() + 1;
            if rest <= name.len() {
                name[rest..].to_string()
            } else {
                name[..start.saturating_sub(1)].to_string()
            }
        }
        None => name.to_string(),
    }
}

fn is_wrapper_segment(segment: &str) -> bool {
    match segment.strip_prefix(WRAPPER_TEST_NAME) {
        Some("") => true,
        Some(suffix) => suffix
            .strip_prefix('#')
            .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit())),
        None => false,
    }
}
