// File: testman/src/suite.rs
//
// Suite Runner
//
// Drives a suite: BeforeAll once, then every registered test as a sub-test
// of a synthetic wrapper unit (`!`) with its own context and suite copy,
// then AfterAll once the wrapper, and with it every parallel test, has
// completed.

use crate::context::{Context, T};
use crate::error::DiscoveryError;
use crate::fixture::construct;
use crate::plugin::{self, Hooks, Lifecycle, Options};
use crate::{TEST_PREFIX, WRAPPER_TEST_NAME};
use parking_lot::Mutex;
use std::any::type_name;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use strum::IntoEnumIterator;

/// A group of tests sharing lifecycle hooks and per-test suite state.
///
/// Tests are inherent methods of the suite registered through
/// [`suite_tests!`](crate::suite_tests!). Lifecycle methods are optional.
///
/// ```rust
/// use testman::{suite_tests, Suite, SuiteTest, T};
///
/// #[derive(Clone, Default)]
/// struct MathSuite {
///     base: i64,
/// }
///
/// impl MathSuite {
///     fn test_add(&mut self, t: &T) {
///         if self.base + 1 != 42 {
///             t.fatal(format!("unexpected base {}", self.base));
///         }
///     }
/// }
///
/// impl Suite<T> for MathSuite {
///     fn tests() -> Vec<SuiteTest<Self, T>> {
///         suite_tests!(MathSuite => test_add)
///     }
///
///     fn before_all(&mut self, _t: &T) {
///         self.base = 41;
///     }
/// }
///
/// testman::Harness::new()
///     .run_suite::<MathSuite, T>("MathSuite", &testman::Options::new())
///     .assert_passed();
/// ```
pub trait Suite<C: Context>: Default + Clone + Send + 'static {
    /// Registered tests, in run order
    fn tests() -> Vec<SuiteTest<Self, C>>;

    /// Once, with the root context, before any test
    fn before_all(&mut self, _t: &C) {}

    /// Before each test body, on that test's suite copy
    fn before_each(&mut self, _t: &C) {}

    /// On each test's exit path, on that test's suite copy
    fn after_each(&mut self, _t: &C) {}

    /// Once, after every test finished
    fn after_all(&mut self, _t: &C) {}

    /// Suite state handed to one test.
    ///
    /// Defaults to `Clone::clone`, which shares whatever the suite holds
    /// behind `Arc`s. Override to give every test fully isolated state.
    fn clone_suite(&self) -> Self {
        self.clone()
    }
}

/// A registered test method
pub struct SuiteTest<S, C> {
    name: String,
    f: Arc<dyn Fn(&mut S, &C) + Send + Sync>,
}

impl<S: 'static, C: 'static> SuiteTest<S, C> {
    /// Register `f` under `name`
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut S, &C) + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            f: Arc::new(f),
        }
    }

    /// Sub-test name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the test body
    pub fn call(&self, suite: &mut S, t: &C) {
        (self.f)(suite, t)
    }
}

impl<S, C> Clone for SuiteTest<S, C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            f: self.f.clone(),
        }
    }
}

impl<S, C> fmt::Debug for SuiteTest<S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuiteTest").field("name", &self.name).finish()
    }
}

/// Build a suite's test list from method names.
///
/// `suite_tests!(MySuite => test_a, test_b)` registers `MySuite::test_a`
/// and `MySuite::test_b` under their own names.
#[macro_export]
macro_rules! suite_tests {
    ($suite:ty => $($name:ident),* $(,)?) => {
        ::std::vec![
            $($crate::SuiteTest::new(::std::stringify!($name), <$suite>::$name)),*
        ]
    };
}

/// Validate the tests registered by `S`
pub fn discover<S, C>() -> Result<Vec<SuiteTest<S, C>>, DiscoveryError>
where
    S: Suite<C>,
    C: Context,
{
    let tests = S::tests();
    let mut seen = HashSet::new();

    for test in &tests {
        if let Some(hook) = Lifecycle::iter().find(|l| l.method_name() == test.name()) {
            return Err(DiscoveryError::HookAsTest {
                suite: type_name::<S>(),
                context: type_name::<C>(),
                name: test.name().to_string(),
                hook: hook.method_name(),
            });
        }

        if !test.name().starts_with(TEST_PREFIX) {
            return Err(DiscoveryError::MissingPrefix {
                suite: type_name::<S>(),
                context: type_name::<C>(),
                name: test.name().to_string(),
                prefix: TEST_PREFIX,
            });
        }

        if !seen.insert(test.name()) {
            return Err(DiscoveryError::Duplicate {
                suite: type_name::<S>(),
                name: test.name().to_string(),
            });
        }
    }

    Ok(tests)
}

/// Run suite `S` under `t`, building contexts of shape `C` with `options`
pub fn suite<S, C>(t: &T, options: &Options)
where
    S: Suite<C>,
    C: Context,
{
    let tests = match discover::<S, C>() {
        Ok(tests) => tests,
        Err(err) => t.fatal(err),
    };

    if tests.is_empty() {
        log::warn!("Suite {} has no tests", type_name::<S>());
        t.log(format!("warn: no tests to run in {}", type_name::<S>()));
        return;
    }

    let root_t = T::new(t.host().clone(), options.clone());
    let root: Arc<C> = match construct(&root_t, None, options) {
        Ok(root) => Arc::new(root),
        Err(err) => root_t.fatal(err),
    };
    let hooks = attach(&*root);

    if log::log_enabled!(log::Level::Debug) {
        log::debug!(
            "Running {} test(s) of {} with {:?}",
            tests.len(),
            type_name::<S>(),
            hooks
        );
    }

    hooks.before_all();
    let mut suite = S::default();
    suite.before_all(&root);

    let runs: Vec<(SuiteTest<S, C>, S)> = tests
        .into_iter()
        .map(|test| (test, suite.clone_suite()))
        .collect();

    let parent = root.clone();
    let options = options.clone();
    handle(&*root).host().run(
        WRAPPER_TEST_NAME,
        Box::new(move |wrapper| {
            for (test, suite) in runs {
                let parent = parent.clone();
                let options = options.clone();
                let name = test.name().to_string();
                wrapper.run(
                    &name,
                    Box::new(move |host| {
                        let t = T::new(host, options.clone());
                        run_test(&t, &test, suite, &parent, &options);
                    }),
                );
            }
        }),
    );

    hooks.after_all();
    suite.after_all(&root);
}

fn run_test<S, C>(t: &T, test: &SuiteTest<S, C>, suite: S, parent: &C, options: &Options)
where
    S: Suite<C>,
    C: Context,
{
    let ctx: Arc<C> = match construct(t, Some(parent), options) {
        Ok(ctx) => Arc::new(ctx),
        Err(err) => t.fatal(err),
    };

    let hooks = attach(&*ctx);
    hooks.before_each();
    t.cleanup(move || hooks.after_each());

    let suite = Arc::new(Mutex::new(suite));
    suite.lock().before_each(&ctx);
    {
        let suite = suite.clone();
        let ctx = ctx.clone();
        t.cleanup(move || suite.lock().after_each(&ctx));
    }

    test.call(&mut suite.lock(), &ctx);
}

/// Run `f` as a sub-test named `name` with a context derived from `t`.
///
/// The child context is constructed with `t` as template, gets its own
/// plugin table installed, and runs BeforeEach / AfterEach plugin hooks
/// around `f`. Returns false if the sub-test failed.
pub fn run<C, F>(t: &C, name: &str, f: F) -> bool
where
    C: Context + Clone,
    F: FnOnce(&C) + Send + 'static,
{
    let parent = t.clone();
    let options = handle(t).options().clone();

    handle(t).host().run(
        name,
        Box::new(move |host| {
            let child_t = T::new(host, options.clone());
            let ctx: C = match construct(&child_t, Some(&parent), &options) {
                Ok(ctx) => ctx,
                Err(err) => child_t.fatal(err),
            };

            let hooks = attach(&ctx);
            hooks.before_each();
            child_t.cleanup(move || hooks.after_each());

            f(&ctx);
        }),
    )
}

/// Merge the plugins of `ctx`, install their table, return their hooks
fn attach<C: Context>(ctx: &C) -> Hooks {
    let merged = plugin::merge(plugin::collect(ctx));
    handle(ctx).install(merged.overrides);
    merged.hooks
}

fn handle<C: Context>(ctx: &C) -> &T {
    ctx.as_ref()
}
