// File: testman/src/plugin/overrides.rs
//
// Intercepted-Operation Table
//
// One interceptor chain per test operation that plugins may wrap. The set of
// operations is fixed; `T` routes every call through the matching chain.

use super::chain::Chain;
use crate::host::CancelToken;
use std::path::PathBuf;
use std::time::SystemTime;

macro_rules! operations {
    ($( $(#[$doc:meta])* $op:ident : $args:ty => $ret:ty ),* $(,)?) => {
        /// Per-operation interceptor chains.
        ///
        /// Every field is a [`Chain`] over the operation's arguments and
        /// result. An empty chain means the host implementation is called
        /// directly.
        #[derive(Clone, Default, Debug)]
        pub struct Overrides {
            $( $(#[$doc])* pub $op: Chain<$args, $ret>, )*
        }

        impl Overrides {
            /// Append `other`'s layers to every operation, inside the
            /// layers already present.
            pub fn merge(&mut self, other: &Overrides) {
                $( self.$op.merge(&other.$op); )*
            }

            /// Total number of interceptor layers across all operations
            pub fn layer_count(&self) -> usize {
                0 $( + self.$op.len() )*
            }

            /// Names of the operations that have at least one layer
            pub fn intercepted(&self) -> Vec<&'static str> {
                let mut names = Vec::new();
                $( if !self.$op.is_empty() { names.push(stringify!($op)); } )*
                names
            }
        }
    };
}

operations! {
    /// `T::name`
    name: () => String,
    /// `T::parallel`
    parallel: () => (),
    /// `T::chdir`
    chdir: PathBuf => (),
    /// `T::setenv`, arguments are `(key, value)`
    setenv: (String, String) => (),
    /// `T::temp_dir`
    temp_dir: () => PathBuf,
    /// `T::log`
    log: String => (),
    /// `T::context`
    context: () => CancelToken,
    /// `T::deadline`
    deadline: () => Option<SystemTime>,
    /// `T::error`
    error: String => (),
    /// `T::skip`
    skip: String => (),
    /// `T::skip_now`
    skip_now: () => (),
    /// `T::skipped`
    skipped: () => bool,
    /// `T::fail`
    fail: () => (),
    /// `T::fail_now`
    fail_now: () => (),
    /// `T::failed`
    failed: () => bool,
    /// `T::fatal`
    fatal: String => (),
}
