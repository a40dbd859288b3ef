use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc, RwLock,
        atomic::{AtomicBool, Ordering},
    },
};

use crate::{
    NodeKey,
    handler::NodeHandler,
    util::{read, write},
};

/// Index of a node handler inside its generation's arena.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandlerId(usize);

impl HandlerId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HandlerId({})", self.0)
    }
}

/// Identity under which a handler is interned.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum HandlerKey {
    /// An existing tag viewed through an interface (or as a plain value).
    Node(NodeKey, Option<String>),
    /// A statically named child that did not exist when first asked for.
    Fixed {
        parent: HandlerId,
        name: String,
        index: usize,
        interface: Option<String>,
    },
    Attribute {
        parent: HandlerId,
        name: String,
    },
}

/// Arena of the node handlers of one document generation.
///
/// Handlers refer to each other by [`HandlerId`]. The arena is retired as a
/// whole when the tree is rebuilt, which invalidates every handler in it.
pub(crate) struct Generation {
    epoch: u64,
    alive: AtomicBool,
    handlers: RwLock<Vec<Arc<NodeHandler>>>,
    index: RwLock<HashMap<HandlerKey, HandlerId>>,
    /// Fixed-child handlers by (tag name, interface name).
    fixed: RwLock<HashMap<(String, Option<String>), Vec<HandlerId>>>,
}

impl Generation {
    pub(crate) fn new(epoch: u64) -> Self {
        Self {
            epoch,
            alive: AtomicBool::new(true),
            handlers: RwLock::new(Vec::new()),
            index: RwLock::new(HashMap::new()),
            fixed: RwLock::new(HashMap::new()),
        }
    }

    #[inline]
    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    #[inline]
    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub(crate) fn retire(&self) {
        self.alive.store(false, Ordering::Release);
    }

    pub(crate) fn get(&self, id: HandlerId) -> Option<Arc<NodeHandler>> {
        read(&self.handlers).get(id.0).cloned()
    }

    pub(crate) fn len(&self) -> usize {
        read(&self.handlers).len()
    }

    pub(crate) fn lookup(&self, key: &HandlerKey) -> Option<HandlerId> {
        read(&self.index).get(key).copied()
    }

    /// Returns the handler interned under `key`, creating it with `make` on
    /// first use.
    pub(crate) fn intern(
        &self,
        key: HandlerKey,
        make: impl FnOnce(HandlerId) -> NodeHandler,
    ) -> HandlerId {
        if let Some(id) = self.lookup(&key) {
            return id;
        }
        let mut index = write(&self.index);
        if let Some(id) = index.get(&key) {
            return *id;
        }
        let id = self.push(&key, make);
        index.insert(key, id);
        id
    }

    /// Creates a handler and interns it under `key`, replacing whatever the
    /// key pointed to.
    pub(crate) fn replace(
        &self,
        key: HandlerKey,
        make: impl FnOnce(HandlerId) -> NodeHandler,
    ) -> HandlerId {
        let mut index = write(&self.index);
        let id = self.push(&key, make);
        index.insert(key, id);
        id
    }

    /// Points `key` at an existing handler.
    pub(crate) fn alias(&self, key: HandlerKey, id: HandlerId) -> HandlerId {
        write(&self.index).insert(key, id);
        id
    }

    /// Fixed-child handlers created for children named `name` viewed through
    /// `interface`.
    pub(crate) fn fixed_handlers(&self, name: &str, interface: Option<&str>) -> Vec<HandlerId> {
        read(&self.fixed)
            .get(&(name.to_owned(), interface.map(str::to_owned)))
            .cloned()
            .unwrap_or_default()
    }

    fn push(&self, key: &HandlerKey, make: impl FnOnce(HandlerId) -> NodeHandler) -> HandlerId {
        let mut handlers = write(&self.handlers);
        let id = HandlerId(handlers.len());
        handlers.push(Arc::new(make(id)));
        drop(handlers);
        if let HandlerKey::Fixed {
            name, interface, ..
        } = key
        {
            write(&self.fixed)
                .entry((name.clone(), interface.clone()))
                .or_default()
                .push(id);
        }
        id
    }
}
