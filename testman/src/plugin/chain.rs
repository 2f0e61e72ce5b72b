//! Interceptor chains for a single operation

use std::fmt;
use std::sync::Arc;

/// One interceptor layer.
///
/// Receives the call arguments and `next`, the rest of the chain ending in
/// the host implementation. A layer may call `next` zero, one or many times.
pub type Interceptor<A, R> = Arc<dyn Fn(A, &dyn Fn(A) -> R) -> R + Send + Sync>;

/// Ordered interceptor layers wrapped around a base implementation.
///
/// Layer 0 is the outermost: it runs first and decides whether (and with which
/// arguments) the following layers and finally the base are reached.
///
/// ```rust
/// use testman::plugin::Chain;
///
/// let mut chain: Chain<u32, u32> = Chain::default();
/// chain.intercept(|x, next| next(x + 1) * 10);
/// chain.intercept(|x, next| next(x * 2));
///
/// // the base sees (3 + 1) * 2, the outer layer scales the result by 10
/// assert_eq!(chain.call(&|x| x, 3), 80);
/// ```
pub struct Chain<A, R> {
    layers: Vec<Interceptor<A, R>>,
}

impl<A, R> Chain<A, R> {
    /// Add a layer inside every layer registered so far
    pub fn intercept<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(A, &dyn Fn(A) -> R) -> R + Send + Sync + 'static,
    {
        self.layers.push(Arc::new(f));
        self
    }

    /// Call through all layers, with `base` as the innermost implementation
    pub fn call(&self, base: &dyn Fn(A) -> R, args: A) -> R {
        self.call_at(0, base, args)
    }

    fn call_at(&self, idx: usize, base: &dyn Fn(A) -> R, args: A) -> R {
        match self.layers.get(idx) {
            Some(layer) => layer(args, &|args| self.call_at(idx + 1, base, args)),
            None => base(args),
        }
    }

    /// Append `other`'s layers inside this chain's layers
    pub fn merge(&mut self, other: &Chain<A, R>) {
        self.layers.extend(other.layers.iter().cloned());
    }

    /// Number of layers
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// True if calls go straight to the base
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl<A, R> Default for Chain<A, R> {
    fn default() -> Self {
        Self { layers: Vec::new() }
    }
}

impl<A, R> Clone for Chain<A, R> {
    fn clone(&self) -> Self {
        Self {
            layers: self.layers.clone(),
        }
    }
}

impl<A, R> fmt::Debug for Chain<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("layers", &self.layers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use proptest::prelude::*;

    #[test]
    fn test_empty_chain_calls_base() {
        let chain: Chain<(), &'static str> = Chain::default();
        assert!(chain.is_empty());
        assert_eq!(chain.call(&|()| "base", ()), "base");
    }

    #[test]
    fn test_layer_can_short_circuit() {
        let mut chain: Chain<(), &'static str> = Chain::default();
        chain.intercept(|_, _next| "intercepted");

        assert_eq!(chain.call(&|()| "base", ()), "intercepted");
    }

    #[test]
    fn test_first_layer_is_outermost() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let mut chain: Chain<(), ()> = Chain::default();

        for id in ["first", "second"] {
            let trace = trace.clone();
            chain.intercept(move |args, next| {
                trace.lock().push(format!("{id}:enter"));
                next(args);
                trace.lock().push(format!("{id}:exit"));
            });
        }

        let base_trace = trace.clone();
        chain.call(&|()| base_trace.lock().push("base".to_string()), ());

        assert_eq!(
            *trace.lock(),
            vec![
                "first:enter",
                "second:enter",
                "base",
                "second:exit",
                "first:exit"
            ]
        );
    }

    #[test]
    fn test_merge_appends_inner_layers() {
        let mut outer: Chain<String, String> = Chain::default();
        outer.intercept(|s, next| format!("<{}>", next(s)));

        let mut inner: Chain<String, String> = Chain::default();
        inner.intercept(|s, next| format!("[{}]", next(s)));

        outer.merge(&inner);

        assert_eq!(outer.len(), 2);
        assert_eq!(outer.call(&|s| s, "x".to_string()), "<[x]>");
    }

    proptest! {
        #[test]
        fn prop_layers_apply_in_registration_order(tags in prop::collection::vec(0u8..10, 0..8)) {
            let mut chain: Chain<Vec<u8>, Vec<u8>> = Chain::default();
            for tag in tags.clone() {
                chain.intercept(move |mut seen, next| {
                    seen.push(tag);
                    next(seen)
                });
            }

            prop_assert_eq!(chain.call(&|seen| seen, Vec::new()), tags);
        }
    }
}
