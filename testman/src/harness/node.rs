// File: testman/src/harness/node.rs
//
// One unit (root or sub-test) of a harness run.
//
// Every child runs on its own thread. `run` blocks until the child either
// finishes or calls `parallel`; parallel children wait until the parent's
// body has returned and then proceed concurrently. A unit completes only
// after all of its children completed, then cancels its context, runs its
// cleanups (last registered first) and removes its temporary directories.

use super::report::{sanitize, Outcome, Report};
use crate::config::HarnessConfig;
use crate::host::{Body, CancelToken, Cleanup, HostTest};
use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};
use tempfile::TempDir;

/// Unwind payload used to stop a unit early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Abort {
    Failed,
    Skipped,
}

/// Settings shared by every unit of one run
pub(crate) struct Shared {
    pub(crate) config: HarnessConfig,
    pub(crate) deadline: Option<SystemTime>,
}

pub(crate) struct Node {
    name: String,
    parent: Weak<Node>,
    this: Weak<Node>,
    shared: Arc<Shared>,
    cancel: CancelToken,
    started: Instant,
    started_at: DateTime<Utc>,
    state: Mutex<State>,
    signal: Condvar,
}

#[derive(Default)]
struct State {
    failed: bool,
    skipped: bool,
    parallel: bool,
    released: bool,
    // set once the parent may stop waiting in `run`
    signalled: bool,
    finished: bool,
    duration: Duration,
    logs: Vec<String>,
    cleanups: Vec<Cleanup>,
    children: Vec<Arc<Node>>,
    pending: Vec<(Arc<Node>, JoinHandle<()>)>,
    sibling_names: HashMap<String, usize>,
    temp: Option<TempDir>,
    temp_seq: usize,
}

impl Node {
    pub(crate) fn root(name: &str, shared: Arc<Shared>) -> Arc<Node> {
        Self::create(name.to_string(), Weak::new(), shared)
    }

    fn create(name: String, parent: Weak<Node>, shared: Arc<Shared>) -> Arc<Node> {
        Arc::new_cyclic(|this| Node {
            name,
            parent,
            this: this.clone(),
            shared,
            cancel: CancelToken::new(),
            started: Instant::now(),
            started_at: Utc::now(),
            state: Mutex::new(State::default()),
            signal: Condvar::new(),
        })
    }

    fn child(&self, name: &str) -> Arc<Node> {
        let mut state = self.state.lock();

        // same rule as `go test`: repeated sibling names get a #NN suffix
        let seen = state.sibling_names.entry(name.to_string()).or_insert(0);
        let unique = if *seen == 0 {
            name.to_string()
        } else {
            format!("{name}#{:02}", *seen)
        };
        *seen += 1;

        let child = Self::create(
            format!("{}/{}", self.name, unique),
            self.this.clone(),
            self.shared.clone(),
        );
        state.children.push(child.clone());
        child
    }

    /// Run `body` as this unit, then complete the unit
    pub(crate) fn execute<F>(self: &Arc<Self>, body: F)
    where
        F: FnOnce(Arc<dyn HostTest>),
    {
        if self.shared.config.verbose {
            println!("=== RUN   {}", self.name);
        }

        let handle: Arc<dyn HostTest> = self.clone();
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| body(handle))) {
            self.record_unwind(payload);
        }

        self.complete();
    }

    fn complete(&self) {
        // let parallel children proceed, then wait for all of them
        let pending = std::mem::take(&mut self.state.lock().pending);
        for (child, _) in &pending {
            child.release();
        }
        for (child, handle) in pending {
            if handle.join().is_err() {
                log::error!("Thread of {} panicked outside of its body", child.name);
                child.state.lock().failed = true;
            }
        }

        let children = self.state.lock().children.clone();
        if children.iter().any(|child| child.state.lock().failed) {
            self.state.lock().failed = true;
        }

        self.cancel.cancel();
        self.run_cleanups();

        let temp = self.state.lock().temp.take();
        if let Some(temp) = temp {
            if log::log_enabled!(log::Level::Debug) {
                log::debug!(
                    "Removing temporary directory {:?} of {}",
                    temp.path(),
                    self.name
                );
            }
            if let Err(err) = temp.close() {
                log::warn!(
                    "Failed to remove temporary directory of {}: {}",
                    self.name,
                    err
                );
            }
        }

        let (outcome, duration) = {
            let mut state = self.state.lock();
            state.duration = self.started.elapsed();
            state.finished = true;
            state.signalled = true;
            self.signal.notify_all();
            (Self::outcome_of(&state), state.duration)
        };

        if self.shared.config.verbose {
            println!(
                "--- {}: {} ({:.2}s)",
                outcome,
                self.name,
                duration.as_secs_f64()
            );
        }
        log::debug!("{} finished: {}", self.name, outcome);
    }

    fn run_cleanups(&self) {
        loop {
            // cleanups may register further cleanups
            let Some(cleanup) = self.state.lock().cleanups.pop() else {
                break;
            };
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(cleanup)) {
                self.record_unwind(payload);
            }
        }
    }

    fn record_unwind(&self, payload: Box<dyn Any + Send>) {
        let mut state = self.state.lock();
        match payload.downcast_ref::<Abort>() {
            Some(Abort::Failed) => state.failed = true,
            Some(Abort::Skipped) => state.skipped = true,
            None => {
                state.failed = true;
                state.logs.push(format!("panic: {}", panic_message(&*payload)));
            }
        }
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.released = true;
        self.signal.notify_all();
    }

    fn outcome_of(state: &State) -> Outcome {
        if state.failed {
            Outcome::Failed
        } else if state.skipped {
            Outcome::Skipped
        } else {
            Outcome::Passed
        }
    }

    /// Whether this unit or one of its ancestors runs in parallel
    fn in_parallel(&self) -> bool {
        if self.state.lock().parallel {
            return true;
        }
        self.parent
            .upgrade()
            .map(|parent| parent.in_parallel())
            .unwrap_or(false)
    }

    fn create_temp_root(&self) -> std::io::Result<TempDir> {
        let prefix = sanitize(&self.name);
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        match &self.shared.config.temp_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
    }

    pub(crate) fn report(&self) -> Report {
        let state = self.state.lock();
        Report {
            name: self.name.clone(),
            outcome: Self::outcome_of(&state),
            started_at: self.started_at.to_rfc3339(),
            duration_ms: state.duration.as_millis() as u64,
            logs: state.logs.clone(),
            children: state.children.iter().map(|child| child.report()).collect(),
        }
    }
}

impl HostTest for Node {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn run(&self, name: &str, body: Body) -> bool {
        let child = self.child(name);
        let runner = child.clone();

        let spawned = thread::Builder::new()
            .name(child.name.clone())
            .spawn(move || runner.execute(body));

        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                self.error(&format!("failed to start {}: {}", child.name, err));
                return false;
            }
        };

        let parallel = {
            let mut state = child.state.lock();
            while !state.signalled {
                child.signal.wait(&mut state);
            }
            state.parallel && !state.finished
        };

        if parallel {
            self.state.lock().pending.push((child, handle));
            return true;
        }

        if handle.join().is_err() {
            child.state.lock().failed = true;
        }

        let failed = child.state.lock().failed;
        if failed {
            self.fail();
        }
        !failed
    }

    fn parallel(&self) {
        // nothing to run alongside at the root
        if self.parent.upgrade().is_none() {
            return;
        }

        let mut state = self.state.lock();
        if state.parallel {
            drop(state);
            self.fatal("parallel called multiple times");
        }

        state.parallel = true;
        state.signalled = true;
        self.signal.notify_all();

        if self.shared.config.verbose {
            println!("=== PAUSE {}", self.name);
        }

        while !state.released {
            self.signal.wait(&mut state);
        }
        drop(state);

        if self.shared.config.verbose {
            println!("=== CONT  {}", self.name);
        }
    }

    fn cleanup(&self, f: Cleanup) {
        self.state.lock().cleanups.push(f);
    }

    fn chdir(&self, dir: &Path) {
        if self.in_parallel() {
            self.fatal("chdir cannot be used in parallel tests or tests with parallel ancestors");
        }

        let previous = std::env::current_dir()
            .unwrap_or_else(|err| {
                self.fatal(&format!("chdir: current directory: {err}"))
            });
        if let Err(err) = std::env::set_current_dir(dir) {
            self.fatal(&format!("chdir {}: {}", dir.display(), err));
        }

        let previous_pwd = std::env::var_os("PWD");
        if cfg!(unix) {
            if let Ok(absolute) = std::env::current_dir() {
                std::env::set_var("PWD", absolute);
            }
        }

        self.cleanup(Box::new(move || {
            if let Err(err) = std::env::set_current_dir(&previous) {
                log::error!(
                    "Failed to restore working directory {:?}: {}",
                    previous,
                    err
                );
            }
            match previous_pwd {
                Some(pwd) => std::env::set_var("PWD", pwd),
                None => std::env::remove_var("PWD"),
            }
        }));
    }

    fn setenv(&self, key: &str, value: &str) {
        if self.in_parallel() {
            self.fatal("setenv cannot be used in parallel tests or tests with parallel ancestors");
        }

        let previous = std::env::var_os(key);
        std::env::set_var(key, value);

        let key = key.to_string();
        self.cleanup(Box::new(move || match previous {
            Some(value) => std::env::set_var(&key, value),
            None => std::env::remove_var(&key),
        }));
    }

    fn temp_dir(&self) -> PathBuf {
        let mut state = self.state.lock();
        if state.temp.is_none() {
            match self.create_temp_root() {
                Ok(dir) => state.temp = Some(dir),
                Err(err) => {
                    drop(state);
                    self.fatal(&format!("temp_dir: {err}"));
                }
            }
        }

        state.temp_seq += 1;
        let seq = state.temp_seq;
        let root = state.temp.as_ref().map(|dir| dir.path().to_path_buf());
        drop(state);

        let Some(root) = root else {
            self.fatal("temp_dir: temporary root missing");
        };

        let dir = root.join(format!("{seq:03}"));
        if let Err(err) = std::fs::create_dir(&dir) {
            self.fatal(&format!("temp_dir {}: {}", dir.display(), err));
        }
        dir
    }

    fn log(&self, msg: &str) {
        if self.shared.config.verbose {
            println!("    {}: {}", self.name, msg);
        }
        log::debug!("[{}] {}", self.name, msg);
        self.state.lock().logs.push(msg.to_string());
    }

    fn context(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn deadline(&self) -> Option<SystemTime> {
        self.shared.deadline
    }

    fn fail(&self) {
        self.state.lock().failed = true;
    }

    fn failed(&self) -> bool {
        self.state.lock().failed
    }

    fn fail_now(&self) -> ! {
        self.fail();
        panic::resume_unwind(Box::new(Abort::Failed))
    }

    fn skip_now(&self) -> ! {
        self.state.lock().skipped = true;
        panic::resume_unwind(Box::new(Abort::Skipped))
    }

    fn skipped(&self) -> bool {
        self.state.lock().skipped
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
