//! Equality policies.
//!
//! Every node decides whether a new value is a change with a [`Comparer`]
//! fixed when the node is constructed. A change bumps the node's version and
//! is propagated; an equal value stops propagation at that node.

use std::fmt;
use std::rc::Rc;

/// Decides whether two values of a node are equal for propagation purposes.
pub struct Comparer<T: 'static>(Rc<dyn Fn(&T, &T) -> bool>);

impl<T: 'static> Comparer<T> {
    /// Use a custom equality function.
    ///
    /// ```rust
    /// use trellis_core::Comparer;
    ///
    /// // Only the first field matters
    /// let by_key = Comparer::new(|l: &(u32, String), r: &(u32, String)| l.0 == r.0);
    /// assert!(by_key.eq(&(1, "a".into()), &(1, "b".into())));
    /// ```
    pub fn new<F>(eq: F) -> Self
    where
        F: Fn(&T, &T) -> bool + 'static,
    {
        Self(Rc::new(eq))
    }

    /// Every new value counts as a change.
    pub fn never() -> Self {
        Self::new(|_, _| false)
    }

    pub fn eq(&self, lhs: &T, rhs: &T) -> bool {
        (self.0)(lhs, rhs)
    }
}

impl<T: PartialEq + 'static> Comparer<T> {
    /// Value equality via `PartialEq`.
    pub fn structural() -> Self {
        Self::new(|lhs: &T, rhs: &T| lhs == rhs)
    }
}

impl<T: PartialEq + 'static> Default for Comparer<T> {
    fn default() -> Self {
        Self::structural()
    }
}

impl<T: 'static> Clone for Comparer<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T: 'static> fmt::Debug for Comparer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Comparer")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_uses_partial_eq() {
        let cmp = Comparer::<i32>::structural();
        assert!(cmp.eq(&1, &1));
        assert!(!cmp.eq(&1, &2));
    }

    #[test]
    fn never_reports_every_value_as_changed() {
        let cmp = Comparer::<i32>::never();
        assert!(!cmp.eq(&1, &1));
    }

    #[test]
    fn custom_comparer_projects_fields() {
        let cmp = Comparer::new(|l: &(i32, i32), r: &(i32, i32)| l.1 == r.1);
        assert!(cmp.eq(&(1, 10), &(2, 10)));
        assert!(!cmp.clone().eq(&(1, 10), &(1, 11)));
    }
}
