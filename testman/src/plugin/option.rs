//! Construction options handed to custom fixture constructors

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// Default limit on fixture member nesting
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Overrides the fixture nesting limit for a construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxDepth(pub usize);

/// Immutable bag of typed option values.
///
/// Values are looked up by type, so each option is usually a small newtype.
/// Cloning is cheap; sub-tests share their parent's options.
///
/// ```rust
/// use testman::plugin::Options;
///
/// #[derive(Debug, PartialEq)]
/// struct Seed(u64);
///
/// let options = Options::new().with(Seed(7));
/// assert_eq!(options.get::<Seed>(), Some(&Seed(7)));
/// ```
#[derive(Clone, Default)]
pub struct Options {
    values: Arc<Vec<(TypeId, Arc<dyn Any + Send + Sync>)>>,
}

impl Options {
    /// Empty option set
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of this set with `value` appended
    pub fn with<O: Any + Send + Sync>(&self, value: O) -> Self {
        let mut values = Vec::with_capacity(self.values.len() + 1);
        values.extend(self.values.iter().cloned());
        values.push((
            TypeId::of::<O>(),
            Arc::new(value) as Arc<dyn Any + Send + Sync>,
        ));
        Self {
            values: Arc::new(values),
        }
    }

    /// Last value of type `O`
    pub fn get<O: Any>(&self) -> Option<&O> {
        self.all::<O>().into_iter().last()
    }

    /// Every value of type `O`, in insertion order
    pub fn all<O: Any>(&self) -> Vec<&O> {
        self.values
            .iter()
            .filter(|(id, _)| *id == TypeId::of::<O>())
            .filter_map(|(_, value)| value.downcast_ref::<O>())
            .collect()
    }

    /// Fixture nesting limit, from `MaxDepth` or the default
    pub fn max_depth(&self) -> usize {
        self.get::<MaxDepth>()
            .map(|d| d.0)
            .unwrap_or(DEFAULT_MAX_DEPTH)
    }

    /// Number of values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if no option was given
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("len", &self.values.len())
            .finish()
    }
}
