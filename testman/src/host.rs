// File: testman/src/host.rs
//
// Host Runtime Surface
//
// The primitives testman needs from whatever actually runs tests. The
// built-in `Harness` implements them in-process; anything else that can run
// named units with cleanup stacks can be plugged in instead.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::watch;

/// Body of a child unit, called with the child's own host handle
pub type Body = Box<dyn FnOnce(Arc<dyn HostTest>) + Send + 'static>;

/// Cleanup callback registered on a unit
pub type Cleanup = Box<dyn FnOnce() + Send + 'static>;

/// Per-unit operations provided by the host test runtime.
///
/// Aborting operations (`fail_now`, `skip_now` and the provided `fatal` and
/// `skip`) never return: they stop the current unit and let its cleanups run.
pub trait HostTest: Send + Sync {
    /// Full `/`-separated name of the unit
    fn name(&self) -> String;

    /// Run `body` as a named child unit.
    ///
    /// Blocks until the child finishes or declares itself parallel. Returns
    /// false if the child failed.
    fn run(&self, name: &str, body: Body) -> bool;

    /// Mark the unit as eligible to run in parallel with its parallel siblings
    fn parallel(&self);

    /// Register a callback for the unit's exit path.
    /// Callbacks run in reverse registration order.
    fn cleanup(&self, f: Cleanup);

    /// Change the working directory, restored on cleanup
    fn chdir(&self, dir: &Path);

    /// Set an environment variable, restored on cleanup
    fn setenv(&self, key: &str, value: &str);

    /// Allocate a fresh directory that is removed after the unit completes
    fn temp_dir(&self) -> PathBuf;

    /// Record a line in the unit's log
    fn log(&self, msg: &str);

    /// Signal cancelled just before the unit's cleanups run
    fn context(&self) -> CancelToken;

    /// Time at which the whole run times out, if a timeout is configured
    fn deadline(&self) -> Option<SystemTime>;

    /// Mark failed, keep running
    fn fail(&self);

    /// Whether the unit has failed
    fn failed(&self) -> bool;

    /// Mark failed and stop the unit
    fn fail_now(&self) -> !;

    /// Mark skipped and stop the unit
    fn skip_now(&self) -> !;

    /// Whether the unit was skipped
    fn skipped(&self) -> bool;

    /// `log` followed by `fail`
    fn error(&self, msg: &str) {
        self.log(msg);
        self.fail();
    }

    /// `log` followed by `fail_now`
    fn fatal(&self, msg: &str) -> ! {
        self.log(msg);
        self.fail_now()
    }

    /// `log` followed by `skip_now`
    fn skip(&self, msg: &str) -> ! {
        self.log(msg);
        self.skip_now()
    }
}

/// Cancellation signal tied to cleanup timing.
///
/// Clones observe the same signal. Cleanup code can bound its waits by
/// checking `is_cancelled()` or awaiting `cancelled()`.
#[derive(Clone, Debug)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    /// Create a token that is not cancelled yet
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fire the signal. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Whether the signal has fired
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the signal fires
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
