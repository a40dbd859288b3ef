//! Reference in-memory tree.
//!
//! [`MemoryTree`] is an arena-backed element tree implementing both
//! [`TreeProvider`] and [`MutationScope`]. It loads from and saves to XML and
//! models full rebuilds through [`MemoryTree::reparse`].
//!
//! ```
//! use tagbind::{MemoryTree, TreeProvider};
//!
//! let tree = MemoryTree::parse("pom", "<project><name>demo</name></project>").unwrap();
//! let root = tree.root().unwrap();
//! let name = tree.children_by_name(root, "name")[0];
//! assert_eq!(tree.text(name).as_deref(), Some("demo"));
//!
//! tree.write(|| tree.set_attribute(root, "version", Some("4"))).unwrap();
//! assert_eq!(tree.to_xml(), r#"<project version="4"><name>demo</name></project>"#);
//! ```

mod xml;

use std::{
    sync::{
        Condvar, Mutex, PoisonError, RwLock,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread::{self, ThreadId},
};

use tracing::debug;

use crate::{
    MutationScope, NodeKey, Stamp, TreeError, TreeProvider, exclusive,
    util::{lock, read, write},
};

#[derive(Clone, Debug, Default)]
pub(crate) struct Element {
    pub(crate) name: String,
    pub(crate) attributes: Vec<(String, String)>,
    pub(crate) text: Option<String>,
    pub(crate) parent: Option<usize>,
    pub(crate) children: Vec<usize>,
}

#[derive(Default)]
pub(crate) struct TreeState {
    epoch: u64,
    pub(crate) nodes: Vec<Option<Element>>,
    pub(crate) root: Option<usize>,
}

impl TreeState {
    fn key(&self, index: usize) -> NodeKey {
        NodeKey::new((self.epoch << 32) | index as u64)
    }

    fn index(&self, node: NodeKey) -> Option<usize> {
        let raw = node.raw();
        if raw >> 32 != self.epoch {
            return None;
        }
        let index = (raw & 0xffff_ffff) as usize;
        self.nodes.get(index)?.as_ref().map(|_| index)
    }

    fn get(&self, node: NodeKey) -> Option<&Element> {
        self.nodes[self.index(node)?].as_ref()
    }

    fn get_mut(&mut self, node: NodeKey) -> Result<&mut Element, TreeError> {
        let index = self.index(node).ok_or(TreeError::InvalidNode(node))?;
        self.nodes[index].as_mut().ok_or(TreeError::InvalidNode(node))
    }
}

/// Mutable element tree kept in memory.
///
/// Mutations must run inside [`MemoryTree::write`] (or
/// [`MutationScope::run_exclusive`]); exclusive access is re-entrant on the
/// owning thread. Every mutation advances the modification stamp.
pub struct MemoryTree {
    name: String,
    state: RwLock<TreeState>,
    stamp: AtomicU64,
    disposed: AtomicBool,
    owner: Mutex<Option<(ThreadId, usize)>>,
    released: Condvar,
}

struct ExclusiveGuard<'a> {
    tree: &'a MemoryTree,
}

impl Drop for ExclusiveGuard<'_> {
    fn drop(&mut self) {
        let mut owner = lock(&self.tree.owner);
        match owner.as_mut() {
            Some((_, depth)) if *depth > 1 => *depth -= 1,
            _ => {
                *owner = None;
                self.tree.released.notify_all();
            }
        }
    }
}

impl MemoryTree {
    /// An empty tree without a root element.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(TreeState::default()),
            stamp: AtomicU64::new(0),
            disposed: AtomicBool::new(false),
            owner: Mutex::new(None),
            released: Condvar::new(),
        }
    }

    pub fn parse(name: impl Into<String>, text: &str) -> Result<Self, TreeError> {
        let tree = Self::new(name);
        let (nodes, root) = xml::parse(text)?;
        {
            let mut state = write(&tree.state);
            state.nodes = nodes;
            state.root = root;
        }
        Ok(tree)
    }

    /// Replaces the whole document, starting a new epoch.
    ///
    /// Every node key handed out before becomes invalid.
    pub fn reparse(&self, text: &str) -> Result<(), TreeError> {
        self.check_disposed()?;
        let (nodes, root) = xml::parse(text)?;
        exclusive(self, || {
            let mut state = write(&self.state);
            state.epoch += 1;
            state.nodes = nodes;
            state.root = root;
            debug!(document = %self.name, epoch = state.epoch, "document reparsed");
        });
        self.bump();
        Ok(())
    }

    /// Serializes the document as compact XML.
    pub fn to_xml(&self) -> String {
        xml::render(&read(&self.state))
    }

    /// Runs `action` with exclusive write access.
    pub fn write<R>(&self, action: impl FnOnce() -> R) -> R {
        exclusive(self, action)
    }

    /// Creates the root element of an empty tree.
    pub fn create_root(&self, name: &str) -> Result<NodeKey, TreeError> {
        self.check_mutation()?;
        let key = {
            let mut state = write(&self.state);
            let index = state.nodes.len();
            state.nodes.push(Some(Element {
                name: name.to_owned(),
                ..Element::default()
            }));
            if let Some(old) = state.root.replace(index) {
                remove_subtree(&mut state, old);
            }
            state.key(index)
        };
        self.bump();
        Ok(key)
    }

    /// Drops the document for good.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
        {
            let mut state = write(&self.state);
            state.epoch += 1;
            state.nodes.clear();
            state.root = None;
        }
        self.bump();
        debug!(document = %self.name, "document disposed");
    }

    #[inline]
    pub fn root_key(&self) -> Option<NodeKey> {
        self.root()
    }

    fn bump(&self) {
        self.stamp.fetch_add(1, Ordering::AcqRel);
    }

    fn check_disposed(&self) -> Result<(), TreeError> {
        if self.disposed.load(Ordering::Acquire) {
            Err(TreeError::Disposed(self.name.clone()))
        } else {
            Ok(())
        }
    }

    fn check_mutation(&self) -> Result<(), TreeError> {
        self.check_disposed()?;
        if self.is_exclusive() {
            Ok(())
        } else {
            Err(TreeError::NotExclusive)
        }
    }

    fn mutate<R>(
        &self,
        node: NodeKey,
        action: impl FnOnce(&mut Element) -> R,
    ) -> Result<R, TreeError> {
        self.check_mutation()?;
        let result = {
            let mut state = write(&self.state);
            action(state.get_mut(node)?)
        };
        self.bump();
        Ok(result)
    }
}

fn remove_subtree(state: &mut TreeState, index: usize) {
    let mut stack = vec![index];
    while let Some(index) = stack.pop() {
        if let Some(element) = state.nodes.get_mut(index).and_then(Option::take) {
            stack.extend(element.children);
        }
    }
}

impl MutationScope for MemoryTree {
    fn run_exclusive(&self, action: &mut dyn FnMut()) {
        let me = thread::current().id();
        {
            let mut owner = lock(&self.owner);
            loop {
                let holder = owner.map(|(thread, _)| thread);
                match holder {
                    None => {
                        *owner = Some((me, 1));
                        break;
                    }
                    Some(thread) if thread == me => {
                        if let Some((_, depth)) = owner.as_mut() {
                            *depth += 1;
                        }
                        break;
                    }
                    Some(_) => {
                        owner = self
                            .released
                            .wait(owner)
                            .unwrap_or_else(PoisonError::into_inner);
                    }
                }
            }
        }
        let _guard = ExclusiveGuard { tree: self };
        action();
    }

    fn is_exclusive(&self) -> bool {
        let me = thread::current().id();
        matches!(*lock(&self.owner), Some((thread, _)) if thread == me)
    }
}

impl TreeProvider for MemoryTree {
    fn document_name(&self) -> String {
        self.name.clone()
    }

    fn epoch(&self) -> u64 {
        read(&self.state).epoch
    }

    fn modification_stamp(&self) -> Stamp {
        Stamp(self.stamp.load(Ordering::Acquire))
    }

    fn root(&self) -> Option<NodeKey> {
        let state = read(&self.state);
        state.root.map(|index| state.key(index))
    }

    fn is_valid(&self, node: NodeKey) -> bool {
        read(&self.state).index(node).is_some()
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn tag_name(&self, node: NodeKey) -> Option<String> {
        read(&self.state).get(node).map(|e| e.name.clone())
    }

    fn parent(&self, node: NodeKey) -> Option<NodeKey> {
        let state = read(&self.state);
        let parent = state.get(node)?.parent?;
        Some(state.key(parent))
    }

    fn children(&self, node: NodeKey) -> Vec<NodeKey> {
        let state = read(&self.state);
        match state.get(node) {
            Some(element) => element.children.iter().map(|i| state.key(*i)).collect(),
            None => Vec::new(),
        }
    }

    fn children_by_name(&self, node: NodeKey, name: &str) -> Vec<NodeKey> {
        let state = read(&self.state);
        let Some(element) = state.get(node) else {
            return Vec::new();
        };
        element
            .children
            .iter()
            .filter(|i| matches!(&state.nodes[**i], Some(child) if child.name == name))
            .map(|i| state.key(*i))
            .collect()
    }

    fn text(&self, node: NodeKey) -> Option<String> {
        read(&self.state).get(node)?.text.clone()
    }

    fn attribute(&self, node: NodeKey, name: &str) -> Option<String> {
        read(&self.state)
            .get(node)?
            .attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
    }

    fn set_text(&self, node: NodeKey, text: Option<&str>) -> Result<(), TreeError> {
        self.mutate(node, |element| element.text = text.map(str::to_owned))
    }

    fn set_attribute(
        &self,
        node: NodeKey,
        name: &str,
        value: Option<&str>,
    ) -> Result<(), TreeError> {
        self.mutate(node, |element| {
            let position = element.attributes.iter().position(|(key, _)| key == name);
            match (position, value) {
                (Some(i), Some(value)) => element.attributes[i].1 = value.to_owned(),
                (Some(i), None) => {
                    element.attributes.remove(i);
                }
                (None, Some(value)) => element
                    .attributes
                    .push((name.to_owned(), value.to_owned())),
                (None, None) => {}
            }
        })
    }

    fn create_child(&self, parent: NodeKey, name: &str) -> Result<NodeKey, TreeError> {
        self.check_mutation()?;
        let key = {
            let mut state = write(&self.state);
            let parent_index = state.index(parent).ok_or(TreeError::InvalidNode(parent))?;
            let index = state.nodes.len();
            state.nodes.push(Some(Element {
                name: name.to_owned(),
                parent: Some(parent_index),
                ..Element::default()
            }));
            state.get_mut(parent)?.children.push(index);
            state.key(index)
        };
        self.bump();
        Ok(key)
    }

    fn remove(&self, node: NodeKey) -> Result<(), TreeError> {
        self.check_mutation()?;
        {
            let mut state = write(&self.state);
            let index = state.index(node).ok_or(TreeError::InvalidNode(node))?;
            let parent = state.nodes[index].as_ref().and_then(|e| e.parent);
            match parent {
                Some(parent) => {
                    if let Some(parent) = state.nodes[parent].as_mut() {
                        parent.children.retain(|child| *child != index);
                    }
                }
                None => state.root = None,
            }
            remove_subtree(&mut state, index);
        }
        self.bump();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_keys_die_with_the_epoch() {
        let tree = MemoryTree::parse("t", "<a><b/></a>").unwrap();
        let root = tree.root().unwrap();
        tree.reparse("<a><b/></a>").unwrap();
        assert!(!tree.is_valid(root));
        assert!(tree.is_valid(tree.root().unwrap()));
        assert_eq!(tree.epoch(), 1);
    }

    #[test]
    fn test_exclusive_is_reentrant() {
        let tree = MemoryTree::new("t");
        tree.write(|| {
            assert!(tree.is_exclusive());
            tree.write(|| assert!(tree.is_exclusive()));
            assert!(tree.is_exclusive());
        });
        assert!(!tree.is_exclusive());
    }

    #[test]
    fn test_remove_drops_subtree() {
        let tree = MemoryTree::parse("t", "<a><b><c/></b></a>").unwrap();
        let root = tree.root().unwrap();
        let b = tree.children(root)[0];
        let c = tree.children(b)[0];
        tree.write(|| tree.remove(b)).unwrap();
        assert!(!tree.is_valid(b));
        assert!(!tree.is_valid(c));
        assert!(tree.children(root).is_empty());
    }
}
