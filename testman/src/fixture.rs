// File: testman/src/fixture.rs
//
// Fixture Constructor
//
// Builds a fresh fixture graph for every test. Each node either has a custom
// constructor (`New`), which is trusted to build the whole value, or is a
// composite whose members are constructed one by one, each paired with the
// same-position member of the parent context's graph. Leaves without a
// custom constructor start from their zero (`Default`) value.
//
// Composites register their members once through `fixture!`, which replaces
// runtime field iteration with a statically checked construction step.

use crate::context::T;
use crate::error::ConstructError;
use crate::plugin::{Options, Plugin};
use std::collections::HashMap;
use std::hash::Hash;
use std::path::PathBuf;
use std::sync::Arc;

/// A value that can be built per test.
///
/// Usually implemented through the [`fixture!`](crate::fixture!) macro.
pub trait Fixture: Sized + Send + Sync + 'static {
    /// Build a new instance, using `parent` (the same-position value in the
    /// parent context, if any) as template.
    fn construct(cx: &mut Constructor<'_>, parent: Option<&Self>) -> Result<Self, ConstructError>;

    /// Push the plugins found in this node and its members, in document order
    fn collect_plugins<'a>(&'a self, _out: &mut Vec<&'a dyn Plugin>) {}
}

/// Custom constructor capability.
///
/// A type with a custom constructor is opaque to the field walk: the
/// constructor receives the test handle, the parent's same-position value
/// and the construction options, and its result is used as-is.
///
/// ```rust
/// use testman::{fixture, New, Options, T};
///
/// #[derive(Clone)]
/// struct Workspace {
///     root: std::path::PathBuf,
/// }
///
/// impl New for Workspace {
///     fn new(t: &T, parent: Option<&Self>, _options: &Options) -> anyhow::Result<Self> {
///         // sub-tests keep working in the directory their parent created
///         match parent {
///             Some(parent) => Ok(parent.clone()),
///             None => Ok(Self { root: t.temp_dir() }),
///         }
///     }
/// }
///
/// fixture!(new Workspace);
/// ```
pub trait New: Sized {
    /// Build the value for the test `t`
    fn new(t: &T, parent: Option<&Self>, options: &Options) -> anyhow::Result<Self>;
}

/// State threaded through one construction: the test being built for, the
/// options, and the member path used for depth limiting and error messages.
///
/// Shapes `fixture!` cannot describe, such as generic contexts, implement
/// [`Fixture`] by hand on top of it:
///
/// ```rust
/// use testman::fixture::Constructor;
/// use testman::{construct, ConstructError, Fixture, Harness, Options, Plugin, T};
///
/// struct Verbose;
///
/// struct Scoped<D> {
///     t: T,
///     data: D,
///     owner: String,
///     depth: usize,
///     verbose: bool,
/// }
///
/// impl<D: Fixture> Fixture for Scoped<D> {
///     fn construct(cx: &mut Constructor<'_>, parent: Option<&Self>) -> Result<Self, ConstructError> {
///         Ok(Scoped {
///             t: cx.member("t", parent.map(|p| &p.t))?,
///             data: cx.member("data", parent.map(|p| &p.data))?,
///             owner: cx.t().name(),
///             depth: cx.depth(),
///             verbose: cx.options().get::<Verbose>().is_some(),
///         })
///     }
///
///     fn collect_plugins<'a>(&'a self, out: &mut Vec<&'a dyn Plugin>) {
///         self.data.collect_plugins(out);
///     }
/// }
///
/// Harness::new()
///     .run("Scoped", |t| {
///         let options = Options::new().with(Verbose);
///         let scoped: Scoped<u32> = construct(t, None, &options).unwrap();
///         assert_eq!(scoped.owner, "Scoped");
///         assert_eq!(scoped.depth, 0);
///         assert!(scoped.verbose);
///     })
///     .assert_passed();
/// ```
pub struct Constructor<'a> {
    t: &'a T,
    options: &'a Options,
    max_depth: usize,
    path: Vec<&'static str>,
}

impl<'a> Constructor<'a> {
    fn new(t: &'a T, options: &'a Options) -> Self {
        Self {
            t,
            options,
            max_depth: options.max_depth(),
            path: Vec::new(),
        }
    }

    /// Test the graph is being built for
    pub fn t(&self) -> &T {
        self.t
    }

    /// Construction options
    pub fn options(&self) -> &Options {
        self.options
    }

    /// Current nesting depth (0 at the root)
    pub fn depth(&self) -> usize {
        self.path.len()
    }

    /// Dotted path of the member being constructed
    pub fn path(&self) -> String {
        if self.path.is_empty() {
            "<root>".to_string()
        } else {
            self.path.join(".")
        }
    }

    /// Construct the member `name` from its parent counterpart
    pub fn member<F: Fixture>(
        &mut self,
        name: &'static str,
        parent: Option<&F>,
    ) -> Result<F, ConstructError> {
        self.path.push(name);
        let result = self.nested(parent);
        self.path.pop();
        result
    }

    /// Construct a nested value at the current path (one level deeper)
    pub fn nested<F: Fixture>(&mut self, parent: Option<&F>) -> Result<F, ConstructError> {
        if self.path.len() > self.max_depth {
            return Err(ConstructError::DepthExceeded {
                path: self.path(),
                limit: self.max_depth,
            });
        }

        F::construct(self, parent)
    }

    /// Run the custom constructor of `F`
    pub fn custom<F: New>(&mut self, parent: Option<&F>) -> Result<F, ConstructError> {
        if log::log_enabled!(log::Level::Trace) {
            log::trace!(
                "Custom constructor {} at {}",
                std::any::type_name::<F>(),
                self.path()
            );
        }

        F::new(self.t, parent, self.options).map_err(|source| ConstructError::Custom {
            path: self.path(),
            type_name: std::any::type_name::<F>(),
            source,
        })
    }
}

/// Build a fixture graph for the test `t`, using `parent` as template.
pub fn construct<F: Fixture>(
    t: &T,
    parent: Option<&F>,
    options: &Options,
) -> Result<F, ConstructError> {
    let mut cx = Constructor::new(t, options);
    F::construct(&mut cx, parent)
}

/// Implement [`Fixture`] for a type.
///
/// - `fixture!(new Ty)`: `Ty` has a custom constructor ([`New`])
/// - `fixture!(plugin Ty)`: custom constructor, and `Ty` is a [`Plugin`]
/// - `fixture!(Ty { a, b })`: composite, every listed member is constructed
///   from its parent counterpart
/// - `fixture!(Ty { a, .. })`: composite, unlisted members stay at `Default`
/// - `fixture!(plugin Ty { a, b })`: composite that is itself a [`Plugin`];
///   it is collected before the plugins among its members
/// - `fixture!(leaf Ty, Uy)`: plain values left at `Default`
///
/// Composite forms take a plain type name. Generic composites implement
/// [`Fixture`] by hand through [`Constructor`].
///
/// ```rust
/// use testman::{fixture, T};
///
/// #[derive(Default)]
/// struct Counter {
///     hits: u64,
/// }
///
/// fixture!(leaf Counter);
///
/// struct Ctx {
///     t: T,
///     counter: Counter,
/// }
///
/// fixture!(Ctx { t, counter });
///
/// impl AsRef<T> for Ctx {
///     fn as_ref(&self) -> &T {
///         &self.t
///     }
/// }
/// ```
#[macro_export]
macro_rules! fixture {
    (new $ty:ty) => {
        impl $crate::Fixture for $ty {
            fn construct(
                cx: &mut $crate::fixture::Constructor<'_>,
                parent: ::std::option::Option<&Self>,
            ) -> ::std::result::Result<Self, $crate::ConstructError> {
                cx.custom::<Self>(parent)
            }
        }
    };
    (plugin $ty:ident { $($field:ident),* $(,)? }) => {
        impl $crate::Fixture for $ty {
            fn construct(
                cx: &mut $crate::fixture::Constructor<'_>,
                parent: ::std::option::Option<&Self>,
            ) -> ::std::result::Result<Self, $crate::ConstructError> {
                ::std::result::Result::Ok(Self {
                    $( $field: cx.member(stringify!($field), parent.map(|p| &p.$field))?, )*
                })
            }

            fn collect_plugins<'a>(&'a self, out: &mut ::std::vec::Vec<&'a dyn $crate::Plugin>) {
                out.push(self);
                $( $crate::Fixture::collect_plugins(&self.$field, out); )*
            }
        }
    };
    (plugin $ty:ty) => {
        impl $crate::Fixture for $ty {
            fn construct(
                cx: &mut $crate::fixture::Constructor<'_>,
                parent: ::std::option::Option<&Self>,
            ) -> ::std::result::Result<Self, $crate::ConstructError> {
                cx.custom::<Self>(parent)
            }

            fn collect_plugins<'a>(&'a self, out: &mut ::std::vec::Vec<&'a dyn $crate::Plugin>) {
                out.push(self);
            }
        }
    };
    (leaf $($ty:ty),+ $(,)?) => {
        $(
            impl $crate::Fixture for $ty {
                fn construct(
                    _cx: &mut $crate::fixture::Constructor<'_>,
                    _parent: ::std::option::Option<&Self>,
                ) -> ::std::result::Result<Self, $crate::ConstructError> {
                    ::std::result::Result::Ok(::std::default::Default::default())
                }
            }
        )+
    };
    ($ty:ident { $($field:ident ,)* .. }) => {
        impl $crate::Fixture for $ty {
            fn construct(
                cx: &mut $crate::fixture::Constructor<'_>,
                parent: ::std::option::Option<&Self>,
            ) -> ::std::result::Result<Self, $crate::ConstructError> {
                ::std::result::Result::Ok(Self {
                    $( $field: cx.member(stringify!($field), parent.map(|p| &p.$field))?, )*
                    ..::std::default::Default::default()
                })
            }

            fn collect_plugins<'a>(&'a self, out: &mut ::std::vec::Vec<&'a dyn $crate::Plugin>) {
                $( $crate::Fixture::collect_plugins(&self.$field, out); )*
            }
        }
    };
    ($ty:ident { $($field:ident),* $(,)? }) => {
        impl $crate::Fixture for $ty {
            fn construct(
                cx: &mut $crate::fixture::Constructor<'_>,
                parent: ::std::option::Option<&Self>,
            ) -> ::std::result::Result<Self, $crate::ConstructError> {
                ::std::result::Result::Ok(Self {
                    $( $field: cx.member(stringify!($field), parent.map(|p| &p.$field))?, )*
                })
            }

            fn collect_plugins<'a>(&'a self, out: &mut ::std::vec::Vec<&'a dyn $crate::Plugin>) {
                $( $crate::Fixture::collect_plugins(&self.$field, out); )*
            }
        }
    };
}

fixture!(leaf (), bool, char, u8, u16, u32, u64, u128, usize);
fixture!(leaf i8, i16, i32, i64, i128, isize, f32, f64, String, PathBuf);

impl<X: Send + Sync + 'static> Fixture for Vec<X> {
    fn construct(
        _cx: &mut Constructor<'_>,
        _parent: Option<&Self>,
    ) -> Result<Self, ConstructError> {
        Ok(Vec::new())
    }
}

impl<X: Send + Sync + 'static> Fixture for Option<X> {
    fn construct(
        _cx: &mut Constructor<'_>,
        _parent: Option<&Self>,
    ) -> Result<Self, ConstructError> {
        Ok(None)
    }
}

impl<K, V> Fixture for HashMap<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn construct(
        _cx: &mut Constructor<'_>,
        _parent: Option<&Self>,
    ) -> Result<Self, ConstructError> {
        Ok(HashMap::new())
    }
}

impl<F: Fixture> Fixture for Box<F> {
    fn construct(cx: &mut Constructor<'_>, parent: Option<&Self>) -> Result<Self, ConstructError> {
        cx.member("*", parent.map(|p| &**p)).map(Box::new)
    }

    fn collect_plugins<'a>(&'a self, out: &mut Vec<&'a dyn Plugin>) {
        (**self).collect_plugins(out);
    }
}

impl<F: Fixture> Fixture for Arc<F> {
    fn construct(cx: &mut Constructor<'_>, parent: Option<&Self>) -> Result<Self, ConstructError> {
        cx.member("*", parent.map(|p| &**p)).map(Arc::new)
    }

    fn collect_plugins<'a>(&'a self, out: &mut Vec<&'a dyn Plugin>) {
        (**self).collect_plugins(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::Harness;
    use crate::plugin::{collect, MaxDepth, Overrides};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq)]
    struct Tracked {
        generation: u32,
        saw_parent: bool,
    }

    impl New for Tracked {
        fn new(_t: &T, parent: Option<&Self>, _options: &Options) -> anyhow::Result<Self> {
            Ok(match parent {
                Some(p) => Tracked {
                    generation: p.generation + 1,
                    saw_parent: true,
                },
                None => Tracked {
                    generation: 0,
                    saw_parent: false,
                },
            })
        }
    }

    fixture!(new Tracked);

    #[derive(Debug)]
    struct Inner {
        tracked: Tracked,
        count: u32,
    }

    fixture!(Inner { tracked, count });

    #[derive(Debug, Default)]
    struct Private {
        label: String,
    }

    #[derive(Debug)]
    struct Outer {
        t: T,
        inner: Inner,
        boxed: Box<Inner>,
        private: Private,
    }

    fixture!(Outer { t, inner, boxed, private });
    fixture!(leaf Private);

    // Only constructed by test_custom_constructor_called_once_per_member
    static COUNTED_CALLS: AtomicUsize = AtomicUsize::new(0);

    struct Counted;

    impl New for Counted {
        fn new(_t: &T, _parent: Option<&Self>, _options: &Options) -> anyhow::Result<Self> {
            COUNTED_CALLS.fetch_add(1, Ordering::SeqCst);
            Ok(Counted)
        }
    }

    fixture!(new Counted);

    struct TwoCounted {
        a: Counted,
        b: Counted,
    }

    fixture!(TwoCounted { a, b });

    struct Failing;

    impl New for Failing {
        fn new(_t: &T, _parent: Option<&Self>, _options: &Options) -> anyhow::Result<Self> {
            anyhow::bail!("port already in use")
        }
    }

    fixture!(new Failing);

    struct WithFailing {
        ok: u8,
        bad: Failing,
    }

    fixture!(WithFailing { ok, bad });

    // Self-referential through a box: only the depth guard stops it
    struct Endless {
        next: Box<Endless>,
    }

    fixture!(Endless { next });

    struct Recorder {
        id: &'static str,
        seen: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Plugin for Recorder {
        fn overrides(&self) -> Overrides {
            Overrides::default()
        }
    }

    impl New for Recorder {
        fn new(_t: &T, _parent: Option<&Self>, _options: &Options) -> anyhow::Result<Self> {
            Ok(Recorder {
                id: "recorder",
                seen: Arc::new(Mutex::new(Vec::new())),
            })
        }
    }

    fixture!(plugin Recorder);

    struct WithPlugins {
        first: Recorder,
        nested: Box<Recorder>,
        plain: u32,
    }

    fixture!(WithPlugins { first, nested, plain });

    // A composite that is also a plugin
    struct Pool {
        member: Recorder,
        size: u32,
    }

    impl Plugin for Pool {}

    fixture!(plugin Pool { member, size });

    struct WithPool {
        pool: Pool,
        after: Recorder,
    }

    fixture!(WithPool { pool, after });

    #[derive(Default)]
    struct Partial {
        tracked: Option<Tracked>,
        hidden: u32,
    }

    fixture!(Partial { tracked, .. });

    #[test]
    fn test_composite_threads_parent_members() {
        Harness::new()
            .run("construct", |t| {
                let root: Outer = construct(t, None, &Options::new()).unwrap();
                assert_eq!(root.inner.tracked.generation, 0);
                assert!(!root.inner.tracked.saw_parent);
                assert_eq!(root.boxed.tracked.generation, 0);
                assert_eq!(root.inner.count, 0);
                assert_eq!(root.private.label, "");

                let child: Outer = construct(t, Some(&root), &Options::new()).unwrap();
                assert_eq!(child.inner.tracked.generation, 1);
                assert!(child.inner.tracked.saw_parent);
                assert_eq!(child.boxed.tracked.generation, 1);

                let grandchild: Outer = construct(t, Some(&child), &Options::new()).unwrap();
                assert_eq!(grandchild.inner.tracked.generation, 2);
            })
            .assert_passed();
    }

    #[test]
    fn test_leaves_are_not_inherited() {
        Harness::new()
            .run("leaves", |t| {
                let mut root: Inner = construct(t, None, &Options::new()).unwrap();
                root.count = 42;

                let child: Inner = construct(t, Some(&root), &Options::new()).unwrap();
                assert_eq!(child.count, 0);
            })
            .assert_passed();
    }

    #[test]
    fn test_custom_constructor_called_once_per_member() {
        Harness::new()
            .run("once", |t| {
                let root: TwoCounted = construct(t, None, &Options::new()).unwrap();
                assert_eq!(COUNTED_CALLS.load(Ordering::SeqCst), 2);

                let _child: TwoCounted = construct(t, Some(&root), &Options::new()).unwrap();
                assert_eq!(COUNTED_CALLS.load(Ordering::SeqCst), 4);
            })
            .assert_passed();
    }

    #[test]
    fn test_context_member_is_current_test() {
        Harness::new()
            .run("ctx", |t| {
                let root: Outer = construct(t, None, &Options::new()).unwrap();
                assert_eq!(root.t.name(), t.name());
            })
            .assert_passed();
    }

    #[test]
    fn test_custom_constructor_error_names_path() {
        Harness::new()
            .run("error", |t| {
                let err = construct::<WithFailing>(t, None, &Options::new())
                    .err()
                    .expect("construction must fail");

                match &err {
                    ConstructError::Custom { path, .. } => assert_eq!(path, "bad"),
                    other => panic!("unexpected error: {other}"),
                }
                assert!(err.to_string().contains("port already in use"));
            })
            .assert_passed();
    }

    #[test]
    fn test_self_referential_shape_hits_depth_guard() {
        Harness::new()
            .run("depth", |t| {
                let err = construct::<Endless>(t, None, &Options::new().with(MaxDepth(8)))
                    .err()
                    .expect("construction must fail");

                match err {
                    ConstructError::DepthExceeded { limit, path } => {
                        assert_eq!(limit, 8);
                        assert!(path.starts_with("next.*.next"));
                    }
                    other => panic!("unexpected error: {other}"),
                }
            })
            .assert_passed();
    }

    #[test]
    fn test_partial_composite_defaults_unlisted_members() {
        Harness::new()
            .run("partial", |t| {
                let value: Partial = construct(t, None, &Options::new()).unwrap();
                assert!(value.tracked.is_none());
                assert_eq!(value.hidden, 0);
            })
            .assert_passed();
    }

    #[test]
    fn test_collect_plugins_in_document_order() {
        Harness::new()
            .run("collect", |t| {
                let value: WithPlugins = construct(t, None, &Options::new()).unwrap();
                assert_eq!(value.plain, 0);

                let plugins = collect(&value);
                assert_eq!(plugins.len(), 2);

                let first = &value.first as &dyn Plugin as *const dyn Plugin as *const ();
                let nested = &*value.nested as &dyn Plugin as *const dyn Plugin as *const ();
                assert_eq!(plugins[0] as *const dyn Plugin as *const (), first);
                assert_eq!(plugins[1] as *const dyn Plugin as *const (), nested);
                assert_eq!(value.first.id, "recorder");
                assert!(value.nested.seen.lock().is_empty());
            })
            .assert_passed();
    }

    #[test]
    fn test_plugin_composite_precedes_its_members() {
        Harness::new()
            .run("pool", |t| {
                let value: WithPool = construct(t, None, &Options::new()).unwrap();
                assert_eq!(value.pool.size, 0);

                let addr = |p: &dyn Plugin| std::ptr::from_ref(p).cast::<()>();
                let plugins: Vec<*const ()> = collect(&value).into_iter().map(addr).collect();
                assert_eq!(
                    plugins,
                    vec![
                        addr(&value.pool),
                        addr(&value.pool.member),
                        addr(&value.after),
                    ]
                );
            })
            .assert_passed();
    }
}
