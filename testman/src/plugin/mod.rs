// File: testman/src/plugin/mod.rs
//
// Plugin Registry
//
// Plugins are fixture members that wrap test operations and/or contribute
// lifecycle hooks. Every context (root and each sub-test) collects the
// plugins reachable from its fixture graph and merges them into one
// Intercepted-Operation Table plus one Hook Set.

/// Interceptor chains
pub mod chain;
/// Lifecycle hook sets
pub mod hooks;
/// Construction options
pub mod option;
/// Intercepted-Operation Table
pub mod overrides;

pub use chain::{Chain, Interceptor};
pub use hooks::{Hook, Hooks, Lifecycle};
pub use option::{MaxDepth, Options, DEFAULT_MAX_DEPTH};
pub use overrides::Overrides;

use crate::fixture::Fixture;

/// Capability bundle discovered on a fixture graph.
///
/// Both methods are called once per context the plugin is found in, so they
/// should build fresh tables from the plugin's (shared) state.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use parking_lot::Mutex;
/// use testman::plugin::{Hooks, Lifecycle, Overrides, Plugin};
///
/// #[derive(Clone, Default)]
/// struct CaptureLogs {
///     lines: Arc<Mutex<Vec<String>>>,
/// }
///
/// impl Plugin for CaptureLogs {
///     fn overrides(&self) -> Overrides {
///         let lines = self.lines.clone();
///         let mut overrides = Overrides::default();
///         overrides.log.intercept(move |msg, next| {
///             lines.lock().push(msg.clone());
///             next(msg)
///         });
///         overrides
///     }
/// }
/// ```
pub trait Plugin: Send + Sync {
    /// Operation interceptors contributed by this plugin
    fn overrides(&self) -> Overrides {
        Overrides::default()
    }

    /// Lifecycle hooks contributed by this plugin
    fn hooks(&self) -> Hooks {
        Hooks::default()
    }
}

/// Every plugin's overrides and hooks folded together
#[derive(Clone, Default, Debug)]
pub struct Merged {
    /// Operation table to install on the context
    pub overrides: Overrides,
    /// Hooks to run around the context's test
    pub hooks: Hooks,
}

/// Plugins reachable from `fixture`, in document order.
///
/// A node that is itself a plugin comes before the plugins among its members,
/// and members are visited in declaration order.
pub fn collect<F: Fixture>(fixture: &F) -> Vec<&dyn Plugin> {
    let mut plugins = Vec::new();
    fixture.collect_plugins(&mut plugins);
    plugins
}

/// Fold plugins in discovery order.
///
/// The first plugin's interceptors end up outermost, and its hooks run first.
pub fn merge<'a, I>(plugins: I) -> Merged
where
    I: IntoIterator<Item = &'a dyn Plugin>,
{
    let mut merged = Merged::default();
    let mut count = 0usize;

    for plugin in plugins {
        merged.overrides.merge(&plugin.overrides());
        merged.hooks.merge(&plugin.hooks());
        count += 1;
    }

    if log::log_enabled!(log::Level::Debug) && count > 0 {
        log::debug!(
            "Merged {} plugin(s): {} interceptor layer(s) on {:?}",
            count,
            merged.overrides.layer_count(),
            merged.overrides.intercepted()
        );
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct Tagger {
        tag: &'static str,
        trace: Arc<Mutex<Vec<String>>>,
    }

    impl Plugin for Tagger {
        fn overrides(&self) -> Overrides {
            let tag = self.tag;
            let mut overrides = Overrides::default();
            overrides
                .name
                .intercept(move |args, next| format!("{tag}({})", next(args)));
            overrides
        }

        fn hooks(&self) -> Hooks {
            let tag = self.tag;
            let trace = self.trace.clone();
            let mut hooks = Hooks::default();
            hooks.on(Lifecycle::BeforeAll, move || {
                trace.lock().push(tag.to_string())
            });
            hooks
        }
    }

    struct Silent;

    impl Plugin for Silent {}

    #[test]
    fn test_merge_nothing() {
        let merged = merge(Vec::<&dyn Plugin>::new());
        assert_eq!(merged.overrides.layer_count(), 0);
        assert_eq!(merged.hooks.count(Lifecycle::BeforeAll), 0);
    }

    #[test]
    fn test_first_discovered_plugin_is_outermost() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let outer = Tagger {
            tag: "outer",
            trace: trace.clone(),
        };
        let inner = Tagger {
            tag: "inner",
            trace: trace.clone(),
        };

        let merged = merge([&outer as &dyn Plugin, &Silent, &inner]);

        let name = merged.overrides.name.call(&|()| "host".to_string(), ());
        assert_eq!(name, "outer(inner(host))");

        merged.hooks.before_all();
        assert_eq!(*trace.lock(), vec!["outer", "inner"]);
    }
}
