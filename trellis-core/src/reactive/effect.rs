//! Effect Registration
//!
//! An effect is a callback attached to a node. It runs with `(old, new)`
//! whenever the node's externally visible value changes.
//!
//! # How Effects Work
//!
//! 1. On a source, effects run synchronously inside `set`, right after the
//!    new value is stored.
//!
//! 2. On a derived node, effects make the node eager: when a write reaches
//!    it, the node is reconciled immediately instead of on the next read,
//!    and its effects run if the value changed per its comparer.
//!
//! 3. Effects on the same node run in registration order and all receive
//!    the same pair of values.
//!
//! # Re-entrancy
//!
//! Callbacks may read and write the graph and may add or remove effects.
//! The list is snapshotted before firing, so such changes apply from the
//! next firing on.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

use crate::graph::NodeId;

/// Unique identifier for a registered effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EffectId(u64);

impl EffectId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Returned by `add_effect`; pass it to `remove_effect` to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EffectHandle {
    node: NodeId,
    id: EffectId,
}

impl EffectHandle {
    /// The node the effect is registered on.
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn id(&self) -> EffectId {
        self.id
    }
}

type Callback<T> = Rc<dyn Fn(&T, &T)>;

/// Ordered effect list of one node.
pub(crate) struct Effects<T: 'static> {
    node: NodeId,
    list: RefCell<SmallVec<[(EffectId, Callback<T>); 2]>>,
}

impl<T: 'static> Effects<T> {
    pub(crate) fn new(node: NodeId) -> Self {
        Self {
            node,
            list: Default::default(),
        }
    }

    pub(crate) fn add<F>(&self, callback: F) -> EffectHandle
    where
        F: Fn(&T, &T) + 'static,
    {
        let id = EffectId::next();
        let callback: Callback<T> = Rc::new(callback);
        self.list.borrow_mut().push((id, callback));
        EffectHandle {
            node: self.node,
            id,
        }
    }

    /// Unregister an effect. Returns false if the handle belongs to another
    /// node or was already removed.
    pub(crate) fn remove(&self, handle: EffectHandle) -> bool {
        if handle.node != self.node {
            return false;
        }
        let mut list = self.list.borrow_mut();
        match list.iter().position(|(id, _)| *id == handle.id) {
            Some(index) => {
                list.remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.list.borrow().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.list.borrow().is_empty()
    }

    pub(crate) fn clear(&self) {
        self.list.borrow_mut().clear();
    }

    /// Run every effect with `(old, new)`, in registration order.
    ///
    /// Returns the number of callbacks invoked.
    pub(crate) fn fire(&self, old: &T, new: &T) -> u64 {
        let snapshot: SmallVec<[Callback<T>; 2]> = self
            .list
            .borrow()
            .iter()
            .map(|(_, callback)| Rc::clone(callback))
            .collect();

        let mut fired = 0;
        for callback in &snapshot {
            callback(old, new);
            fired += 1;
        }
        fired
    }
}

impl<T: 'static> fmt::Debug for Effects<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effects")
            .field("node", &self.node)
            .field("count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(raw: u64) -> NodeId {
        NodeId::from_raw(raw)
    }

    #[test]
    fn effects_fire_in_registration_order() {
        let effects = Effects::<i32>::new(node(0));
        let log = Rc::new(RefCell::new(Vec::new()));

        for tag in ["first", "second"] {
            let log = log.clone();
            effects.add(move |old, new| log.borrow_mut().push((tag, *old, *new)));
        }

        assert_eq!(effects.fire(&1, &2), 2);
        assert_eq!(*log.borrow(), vec![("first", 1, 2), ("second", 1, 2)]);
    }

    #[test]
    fn effect_ids_are_unique() {
        let effects = Effects::<()>::new(node(0));
        let h1 = effects.add(|_, _| {});
        let h2 = effects.add(|_, _| {});
        assert_ne!(h1.id(), h2.id());
        assert_eq!(h1.node(), node(0));
    }

    #[test]
    fn remove_only_matches_own_handles() {
        let mine = Effects::<i32>::new(node(0));
        let other = Effects::<i32>::new(node(1));

        let handle = mine.add(|_, _| {});
        assert!(!other.remove(handle));
        assert!(mine.remove(handle));
        assert!(!mine.remove(handle));
        assert!(mine.is_empty());
    }

    #[test]
    fn removal_during_firing_applies_next_time() {
        let effects = Rc::new(Effects::<i32>::new(node(0)));
        let calls = Rc::new(RefCell::new(0));
        let victim = Rc::new(RefCell::new(None));

        {
            let effects_clone = effects.clone();
            let victim = victim.clone();
            effects.add(move |_, _| {
                if let Some(handle) = victim.borrow_mut().take() {
                    effects_clone.remove(handle);
                }
            });
        }
        {
            let calls = calls.clone();
            *victim.borrow_mut() = Some(effects.add(move |_, _| *calls.borrow_mut() += 1));
        }

        // Snapshot still includes the removed effect
        effects.fire(&0, &1);
        assert_eq!(*calls.borrow(), 1);
        assert_eq!(effects.len(), 1);

        effects.fire(&1, &2);
        assert_eq!(*calls.borrow(), 1);
    }
}
