//! Typed value storage shared by sources and derived nodes.

use std::cell::RefCell;

use super::effect::Effects;
use super::equality::Comparer;
use crate::graph::NodeId;

/// The value of a node together with its equality policy and effects.
#[derive(Debug)]
pub(crate) struct ValueCell<T: 'static> {
    value: RefCell<T>,
    comparer: Comparer<T>,
    effects: Effects<T>,
}

impl<T: Clone + 'static> ValueCell<T> {
    pub(crate) fn new(node: NodeId, value: T, comparer: Comparer<T>) -> Self {
        Self {
            value: RefCell::new(value),
            comparer,
            effects: Effects::new(node),
        }
    }

    pub(crate) fn get(&self) -> T {
        self.value.borrow().clone()
    }

    /// Store a new value, returning the previous one.
    pub(crate) fn replace(&self, value: T) -> T {
        self.value.replace(value)
    }

    /// Compare `candidate` with the current value.
    pub(crate) fn is_current(&self, candidate: &T) -> bool {
        self.comparer.eq(&self.value.borrow(), candidate)
    }

    pub(crate) fn comparer(&self) -> &Comparer<T> {
        &self.comparer
    }

    pub(crate) fn effects(&self) -> &Effects<T> {
        &self.effects
    }
}
