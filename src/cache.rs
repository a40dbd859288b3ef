use std::{
    any::TypeId,
    sync::{Arc, Mutex},
};

use tracing::trace;

use crate::{
    Converter, Stamp, Value,
    convert::instance_of,
    util::lock,
};

struct Entry {
    class: TypeId,
    instance: usize,
    value: Option<Value>,
}

#[derive(Default)]
struct State {
    stamp: Option<Stamp>,
    entries: Vec<Entry>,
}

/// Converted values of one node handler, valid for one modification stamp.
///
/// Holds at most one entry per converter class. Reading with another
/// instance of a class that already has an entry replaces that entry.
#[derive(Default)]
pub(crate) struct ValueCache {
    state: Mutex<State>,
}

impl ValueCache {
    /// Returns the cached value for `converter` if it was computed at `stamp`.
    ///
    /// The outer `Option` is the hit/miss, the inner one the value itself.
    pub(crate) fn get(
        &self,
        stamp: Stamp,
        converter: &Arc<dyn Converter>,
    ) -> Option<Option<Value>> {
        let mut state = lock(&self.state);
        match state.stamp {
            Some(cached) if cached == stamp => {}
            Some(cached) if cached > stamp => return None,
            _ => {
                if !state.entries.is_empty() {
                    trace!(
                        dropped = state.entries.len(),
                        stamp = stamp.0,
                        "value cache invalidated"
                    );
                }
                state.entries.clear();
                state.stamp = Some(stamp);
                return None;
            }
        }
        let instance = instance_of(converter);
        let hit = state
            .entries
            .iter()
            .find(|entry| entry.instance == instance && entry.class == converter.class())
            .map(|entry| entry.value.clone());
        trace!(hit = hit.is_some(), target = converter.target(), "value cache lookup");
        hit
    }

    /// Stores a value computed at `stamp`.
    ///
    /// Values computed before the latest known stamp are dropped.
    pub(crate) fn insert(
        &self,
        stamp: Stamp,
        converter: &Arc<dyn Converter>,
        value: Option<Value>,
    ) {
        let mut state = lock(&self.state);
        match state.stamp {
            Some(cached) if cached > stamp => return,
            Some(cached) if cached == stamp => {}
            _ => {
                state.entries.clear();
                state.stamp = Some(stamp);
            }
        }
        let class = converter.class();
        let instance = instance_of(converter);
        match state.entries.iter_mut().find(|entry| entry.class == class) {
            Some(entry) => {
                entry.instance = instance;
                entry.value = value;
            }
            None => state.entries.push(Entry {
                class,
                instance,
                value,
            }),
        }
    }

    pub(crate) fn clear(&self) {
        let mut state = lock(&self.state);
        state.entries.clear();
        state.stamp = None;
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }
}
