use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use crate::{
    Error, Result, View, ViewInterface,
    handler::Session,
    tree::{TreeNode, TreeProvider},
};

/// Ambient lookup scope of a conversion.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Scope {
    /// Identity of the containing document.
    pub document: String,
    /// Enclosing module, when the host has such a notion.
    pub module: Option<String>,
}

/// Supplies the [`Scope`] of conversions.
pub trait ContextProvider: Send + Sync {
    fn scope(&self, tree: &dyn TreeProvider, node: Option<&TreeNode>) -> Scope;
}

/// Scope made of the document name only.
#[derive(Clone, Copy, Debug, Default)]
pub struct DocumentContext;

impl ContextProvider for DocumentContext {
    fn scope(&self, tree: &dyn TreeProvider, _node: Option<&TreeNode>) -> Scope {
        Scope {
            document: tree.document_name(),
            module: None,
        }
    }
}

/// Cooperative cancellation flag shared with the host.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }

    #[inline]
    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Fails with [`Error::Canceled`] once the token is canceled.
    #[inline]
    pub fn check(&self) -> Result<()> {
        if self.is_canceled() {
            Err(Error::Canceled)
        } else {
            Ok(())
        }
    }
}

/// Context handed to converters and text injectors.
pub struct ConvertContext<'a> {
    session: Option<Session<'a>>,
    node: Option<TreeNode>,
    scope: Scope,
}

impl<'a> ConvertContext<'a> {
    pub(crate) fn new(session: Session<'a>, node: Option<TreeNode>) -> Self {
        let binding = session.binding;
        let scope = binding
            .context_provider()
            .scope(binding.tree().as_ref(), node.as_ref());
        Self {
            session: Some(session),
            node,
            scope,
        }
    }

    /// A context that is not attached to any document.
    ///
    /// Reference resolution finds nothing and cancellation never triggers.
    pub fn standalone() -> ConvertContext<'static> {
        ConvertContext {
            session: None,
            node: None,
            scope: Scope::default(),
        }
    }

    /// A detached context with an explicit scope.
    pub fn with_scope(scope: Scope) -> ConvertContext<'static> {
        ConvertContext {
            session: None,
            node: None,
            scope,
        }
    }

    #[inline]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    #[inline]
    pub fn document(&self) -> &str {
        &self.scope.document
    }

    #[inline]
    pub fn module(&self) -> Option<&str> {
        self.scope.module.as_deref()
    }

    /// The tree position being converted, if any.
    #[inline]
    pub fn node(&self) -> Option<&TreeNode> {
        self.node.as_ref()
    }

    pub fn tree(&self) -> Option<&dyn TreeProvider> {
        self.session.map(|s| s.tree())
    }

    pub fn check_canceled(&self) -> Result<()> {
        match self.session {
            Some(session) => session.binding.cancellation().check(),
            None => Ok(()),
        }
    }

    /// Finds the view of `interface` whose name attribute equals `name`.
    ///
    /// Walks the document in document order and checks the cancellation
    /// token every few nodes.
    pub fn resolve_named(&self, interface: &Arc<ViewInterface>, name: &str) -> Result<Option<View>> {
        let Some(session) = self.session else {
            return Ok(None);
        };
        self.check_canceled()?;
        let tree = session.tree();
        let Some(root) = tree.root() else {
            return Ok(None);
        };
        let interval = session
            .binding
            .engine()
            .config()
            .cancellation_check_interval
            .max(1);
        let attribute = interface.name_attribute();
        let mut stack = vec![root];
        let mut visited = 0usize;
        while let Some(node) = stack.pop() {
            visited += 1;
            if visited % interval == 0 {
                self.check_canceled()?;
            }
            let tag_matches = interface
                .tag()
                .is_none_or(|tag| tree.tag_name(node).as_deref() == Some(tag));
            if tag_matches && tree.attribute(node, attribute).as_deref() == Some(name) {
                session.binding.engine().register_interface(interface)?;
                let id = session.node_handler(node, Some(interface.clone()));
                return Ok(Some(session.view(id)));
            }
            stack.extend(tree.children(node).into_iter().rev());
        }
        Ok(None)
    }

    /// Reads the name attribute of a view's tag.
    pub fn view_name(&self, view: &View) -> Result<Option<String>> {
        let Some(interface) = view.interface() else {
            return Ok(None);
        };
        match view.tree_node()? {
            Some(TreeNode::Tag(key)) => Ok(view
                .binding()
                .tree()
                .attribute(key, interface.name_attribute())),
            _ => Ok(None),
        }
    }
}
