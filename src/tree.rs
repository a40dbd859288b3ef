//! Collaborator contracts for the externally owned tree.
//!
//! The binding core never owns tree nodes. It talks to the document through
//! [`TreeProvider`] for reads and writes, and relies on [`MutationScope`] for
//! the reader/writer discipline around writes.

use std::fmt;

/// Opaque key of a tag node in the external tree.
///
/// Providers decide how keys are allocated; the core only compares and hashes
/// them and asks the provider whether they are still valid.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeKey(u64);

impl NodeKey {
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeKey({:#x})", self.0)
    }
}

/// A position in the tree that carries text: a tag or one of its attributes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TreeNode {
    Tag(NodeKey),
    Attribute { owner: NodeKey, name: String },
}

impl TreeNode {
    /// The tag this position lives on.
    pub fn tag(&self) -> NodeKey {
        match self {
            Self::Tag(key) => *key,
            Self::Attribute { owner, .. } => *owner,
        }
    }

    #[inline]
    pub fn is_tag(&self) -> bool {
        matches!(self, Self::Tag(_))
    }
}

/// Modification stamp of a tree.
///
/// Monotonically increasing; the core compares stamps but never creates them.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct Stamp(pub u64);

/// Errors reported by tree collaborators.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    /// The node key does not belong to the live tree.
    #[error("invalid tree node {0:?}")]
    InvalidNode(NodeKey),

    /// A mutation was attempted without holding the exclusive scope.
    #[error("tree mutation outside of the exclusive scope")]
    NotExclusive,

    /// The tree was disposed and will never come back.
    #[error("tree `{0}` is disposed")]
    Disposed(String),

    /// The document text could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),
}

/// Read and write access to the external tree.
///
/// Reads are expected to run under the caller's read discipline. Writes run
/// inside [`MutationScope::run_exclusive`] and must advance
/// [`modification_stamp`](TreeProvider::modification_stamp).
pub trait TreeProvider: Send + Sync {
    /// Name of the document, used as the ambient scope of conversions.
    fn document_name(&self) -> String;

    /// Rebuild counter. Changes every time the whole tree is recreated.
    fn epoch(&self) -> u64;

    fn modification_stamp(&self) -> Stamp;

    fn root(&self) -> Option<NodeKey>;

    fn is_valid(&self, node: NodeKey) -> bool;

    /// Returns `true` once the provider knows the document will never come back.
    fn is_disposed(&self) -> bool {
        false
    }

    fn tag_name(&self, node: NodeKey) -> Option<String>;

    fn parent(&self, node: NodeKey) -> Option<NodeKey>;

    /// Child tags in document order.
    fn children(&self, node: NodeKey) -> Vec<NodeKey>;

    /// Child tags named `name`, in document order.
    fn children_by_name(&self, node: NodeKey, name: &str) -> Vec<NodeKey> {
        self.children(node)
            .into_iter()
            .filter(|child| self.tag_name(*child).as_deref() == Some(name))
            .collect()
    }

    /// Text content of a tag, `None` when the tag has no text.
    fn text(&self, node: NodeKey) -> Option<String>;

    fn attribute(&self, node: NodeKey, name: &str) -> Option<String>;

    fn set_text(&self, node: NodeKey, text: Option<&str>) -> Result<(), TreeError>;

    fn set_attribute(&self, node: NodeKey, name: &str, value: Option<&str>)
    -> Result<(), TreeError>;

    /// Appends a new empty child tag and returns its key.
    fn create_child(&self, parent: NodeKey, name: &str) -> Result<NodeKey, TreeError>;

    fn remove(&self, node: NodeKey) -> Result<(), TreeError>;

    /// Raw text at a position: tag text or attribute value.
    fn raw_text(&self, node: &TreeNode) -> Option<String> {
        match node {
            TreeNode::Tag(key) => self.text(*key),
            TreeNode::Attribute { owner, name } => self.attribute(*owner, name),
        }
    }

    fn exists(&self, node: &TreeNode) -> bool {
        match node {
            TreeNode::Tag(key) => self.is_valid(*key),
            TreeNode::Attribute { owner, name } => {
                self.is_valid(*owner) && self.attribute(*owner, name).is_some()
            }
        }
    }
}

/// The exclusive mutation scope ("write action") guarding the tree.
pub trait MutationScope: Send + Sync {
    /// Runs `action` while holding exclusive write access.
    ///
    /// Implementations must call `action` exactly once before returning,
    /// blocking until access is granted. [`exclusive`] relies on it.
    fn run_exclusive(&self, action: &mut dyn FnMut());

    /// Returns `true` when the calling thread currently holds exclusive access.
    fn is_exclusive(&self) -> bool;
}

/// Convenience wrapper around [`MutationScope::run_exclusive`] returning a value.
///
/// # Panics
///
/// Panics if the scope returns without running `action`, which breaks the
/// [`MutationScope::run_exclusive`] contract.
pub fn exclusive<S, R>(scope: &S, action: impl FnOnce() -> R) -> R
where
    S: MutationScope + ?Sized,
{
    let mut action = Some(action);
    let mut result = None;
    scope.run_exclusive(&mut || {
        if let Some(action) = action.take() {
            result = Some(action());
        }
    });
    match result {
        Some(result) => result,
        None => panic!("MutationScope::run_exclusive returned without running the action"),
    }
}
