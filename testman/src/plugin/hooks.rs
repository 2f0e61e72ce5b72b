//! Lifecycle hook sets

use std::fmt;
use std::sync::Arc;
use strum::{Display, EnumIter, IntoStaticStr};

/// Lifecycle points a suite run exposes to plugins and suites
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
pub enum Lifecycle {
    /// Once per suite, before any test
    BeforeAll,
    /// Before every test body
    BeforeEach,
    /// On every test's exit path
    AfterEach,
    /// Once per suite, after every test (parallel ones included) finished
    AfterAll,
}

impl Lifecycle {
    /// Method name a suite implements for this lifecycle point
    pub fn method_name(self) -> &'static str {
        match self {
            Lifecycle::BeforeAll => "before_all",
            Lifecycle::BeforeEach => "before_each",
            Lifecycle::AfterEach => "after_each",
            Lifecycle::AfterAll => "after_all",
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

/// A lifecycle callback
pub type Hook = Arc<dyn Fn() + Send + Sync>;

/// Ordered callbacks for each lifecycle point
#[derive(Clone, Default)]
pub struct Hooks {
    slots: [Vec<Hook>; 4],
}

impl Hooks {
    /// Register `f` after the hooks already present for `lifecycle`
    pub fn on<F>(&mut self, lifecycle: Lifecycle, f: F) -> &mut Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.slots[lifecycle.slot()].push(Arc::new(f));
        self
    }

    /// Run every hook registered for `lifecycle`, in registration order
    pub fn invoke(&self, lifecycle: Lifecycle) {
        for hook in &self.slots[lifecycle.slot()] {
            hook();
        }
    }

    /// Number of hooks registered for `lifecycle`
    pub fn count(&self, lifecycle: Lifecycle) -> usize {
        self.slots[lifecycle.slot()].len()
    }

    /// Append `other`'s hooks after ours, per lifecycle point
    pub fn merge(&mut self, other: &Hooks) {
        for (mine, theirs) in self.slots.iter_mut().zip(other.slots.iter()) {
            mine.extend(theirs.iter().cloned());
        }
    }

    /// Hooks run by `invoke(Lifecycle::BeforeAll)`
    pub fn before_all(&self) {
        self.invoke(Lifecycle::BeforeAll);
    }

    /// Hooks run by `invoke(Lifecycle::BeforeEach)`
    pub fn before_each(&self) {
        self.invoke(Lifecycle::BeforeEach);
    }

    /// Hooks run by `invoke(Lifecycle::AfterEach)`
    pub fn after_each(&self) {
        self.invoke(Lifecycle::AfterEach);
    }

    /// Hooks run by `invoke(Lifecycle::AfterAll)`
    pub fn after_all(&self) {
        self.invoke(Lifecycle::AfterAll);
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("before_all", &self.count(Lifecycle::BeforeAll))
            .field("before_each", &self.count(Lifecycle::BeforeEach))
            .field("after_each", &self.count(Lifecycle::AfterEach))
            .field("after_all", &self.count(Lifecycle::AfterAll))
            .finish()
    }
}
