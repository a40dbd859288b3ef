//! Node handlers: the per-position binding objects behind views.

use std::sync::Arc;

use tracing::{trace, warn};

use crate::{
    ConvertContext, Converter, DocumentBinding, Error, NodeKey, Result, TreeNode, TreeProvider,
    Value, View, ViewInterface,
    cache::ValueCache,
    generation::{Generation, HandlerId, HandlerKey},
    view::WeakView,
};

/// Where a handler's tree position is found.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Location {
    /// An existing tag.
    Node(NodeKey),
    /// The `index`-th child tag named `name` of the parent handler's tag.
    /// May not exist yet.
    Fixed {
        parent: HandlerId,
        name: String,
        index: usize,
    },
    /// An attribute of the parent handler's tag. May not exist yet.
    Attribute { parent: HandlerId, name: String },
}

/// Borrowed access to a document binding and one of its generations.
#[derive(Clone, Copy)]
pub(crate) struct Session<'a> {
    pub(crate) binding: &'a Arc<DocumentBinding>,
    pub(crate) generation: &'a Arc<Generation>,
}

impl<'a> Session<'a> {
    #[inline]
    pub(crate) fn new(binding: &'a Arc<DocumentBinding>, generation: &'a Arc<Generation>) -> Self {
        Self {
            binding,
            generation,
        }
    }

    #[inline]
    pub(crate) fn tree(self) -> &'a dyn TreeProvider {
        self.binding.tree().as_ref()
    }

    pub(crate) fn handler(self, id: HandlerId) -> Result<Arc<NodeHandler>> {
        self.generation
            .get(id)
            .ok_or_else(|| Error::stale(format!("{id:?} is not part of this generation")))
    }

    /// Fails once the generation no longer matches the tree.
    pub(crate) fn check_alive(self) -> Result<()> {
        let tree = self.tree();
        if tree.is_disposed() {
            return Err(Error::stale(format!(
                "document `{}` is disposed",
                tree.document_name()
            )));
        }
        if !self.generation.is_alive() || self.generation.epoch() != tree.epoch() {
            return Err(Error::stale(format!(
                "document `{}` was rebuilt",
                tree.document_name()
            )));
        }
        Ok(())
    }

    /// The handler of an existing tag viewed through `interface`.
    ///
    /// A fixed-child handler that currently resolves to `node` is reused, so
    /// one tag seen through one interface has a single handler.
    pub(crate) fn node_handler(self, node: NodeKey, interface: Option<Arc<ViewInterface>>) -> HandlerId {
        let name = interface.as_ref().map(|i| i.name().to_owned());
        let key = HandlerKey::Node(node, name.clone());
        let found = self.generation.lookup(&key);
        if let Some(id) = found {
            if self.resolves_to(id, node) {
                return id;
            }
        }
        if let Some(id) = self.adopt_fixed(node, name.as_deref()) {
            return self.generation.alias(key, id);
        }
        let make = |id| NodeHandler::new(id, Location::Node(node), interface);
        match found {
            Some(_) => self.generation.replace(key, make),
            None => self.generation.intern(key, make),
        }
    }

    /// Returns `true` if handler `id` currently sits on `node`.
    pub(crate) fn resolves_to(self, id: HandlerId, node: NodeKey) -> bool {
        let Ok(handler) = self.handler(id) else {
            return false;
        };
        match handler.location() {
            Location::Node(key) => *key == node,
            _ => matches!(handler.tree_node(self), Ok(Some(TreeNode::Tag(key))) if key == node),
        }
    }

    fn adopt_fixed(self, node: NodeKey, interface: Option<&str>) -> Option<HandlerId> {
        let tag = self.tree().tag_name(node)?;
        self.generation
            .fixed_handlers(&tag, interface)
            .into_iter()
            .find(|id| self.resolves_to(*id, node))
    }

    pub(crate) fn view(self, id: HandlerId) -> View {
        View::new(self.binding.clone(), self.generation.clone(), id)
    }

    /// Debug-build check that writes happen inside the exclusive scope.
    pub(crate) fn check_write_access(self) -> Result<()> {
        if cfg!(debug_assertions)
            && self.binding.engine().config().check_write_access
            && !self.binding.mutation_scope().is_exclusive()
        {
            return Err(Error::WriteOutsideExclusiveScope);
        }
        Ok(())
    }
}

/// Binding object anchoring a view or a value to one tree position.
pub(crate) struct NodeHandler {
    id: HandlerId,
    location: Location,
    interface: Option<Arc<ViewInterface>>,
    cache: ValueCache,
}

impl NodeHandler {
    pub(crate) fn new(id: HandlerId, location: Location, interface: Option<Arc<ViewInterface>>) -> Self {
        Self {
            id,
            location,
            interface,
            cache: ValueCache::default(),
        }
    }

    #[inline]
    pub(crate) fn id(&self) -> HandlerId {
        self.id
    }

    #[inline]
    pub(crate) fn location(&self) -> &Location {
        &self.location
    }

    #[inline]
    pub(crate) fn interface(&self) -> Option<&Arc<ViewInterface>> {
        self.interface.as_ref()
    }

    pub(crate) fn cached_value_count(&self) -> usize {
        self.cache.len()
    }

    /// The tree position of this handler.
    ///
    /// `Ok(None)` means the position does not exist yet; an error means the
    /// handler itself is stale.
    pub(crate) fn tree_node(&self, session: Session<'_>) -> Result<Option<TreeNode>> {
        session.check_alive()?;
        let tree = session.tree();
        match &self.location {
            Location::Node(key) => {
                if tree.is_valid(*key) {
                    Ok(Some(TreeNode::Tag(*key)))
                } else {
                    Err(Error::stale(format!("tree node {key:?} was removed")))
                }
            }
            Location::Fixed {
                parent,
                name,
                index,
            } => match session.handler(*parent)?.tree_node(session)? {
                Some(TreeNode::Tag(owner)) => Ok(tree
                    .children_by_name(owner, name)
                    .get(*index)
                    .map(|key| TreeNode::Tag(*key))),
                _ => Ok(None),
            },
            Location::Attribute { parent, name } => {
                match session.handler(*parent)?.tree_node(session)? {
                    Some(TreeNode::Tag(owner)) if tree.attribute(owner, name).is_some() => {
                        Ok(Some(TreeNode::Attribute {
                            owner,
                            name: name.clone(),
                        }))
                    }
                    _ => Ok(None),
                }
            }
        }
    }

    pub(crate) fn tag(&self, session: Session<'_>) -> Result<Option<String>> {
        match self.tree_node(session)? {
            Some(TreeNode::Tag(key)) => Ok(session.tree().tag_name(key)),
            _ => Ok(None),
        }
    }

    pub(crate) fn raw_text(&self, session: Session<'_>) -> Result<Option<String>> {
        Ok(self
            .tree_node(session)?
            .and_then(|node| session.tree().raw_text(&node)))
    }

    /// Reads and converts the text of this position, consulting the value
    /// cache first.
    pub(crate) fn read_value(
        &self,
        session: Session<'_>,
        converter: &Arc<dyn Converter>,
    ) -> Result<Option<Value>> {
        let node = self.tree_node(session)?;
        let caching = session.binding.engine().config().cache_values;
        // The stamp is taken before the text so a concurrent write can only
        // make the stored entry look older than it is.
        let stamp = session.tree().modification_stamp();
        if caching {
            match self.cache.get(stamp, converter) {
                Some(None) => return Ok(None),
                Some(Some(hit)) => match hit.downcast_ref::<WeakView>() {
                    Some(weak) => {
                        if let Some(view) = weak.upgrade() {
                            return Ok(Some(Arc::new(view) as Value));
                        }
                    }
                    None => return Ok(Some(hit)),
                },
                None => {}
            }
        }
        let value = match node {
            Some(node) => match session.tree().raw_text(&node) {
                Some(raw) => {
                    let cx = ConvertContext::new(session, Some(node.clone()));
                    let text = session.binding.inject(&raw, &node, &cx);
                    match converter.from_text(&text, &cx) {
                        Ok(value) => value,
                        Err(e) => {
                            warn!(
                                handler = ?self.id,
                                target = converter.target(),
                                error = %e,
                                "conversion failed"
                            );
                            return Err(e);
                        }
                    }
                }
                None => None,
            },
            None => None,
        };
        if caching {
            self.cache.insert(stamp, converter, value.as_ref().map(detach));
        }
        Ok(value)
    }

    /// Converts `value` to text and writes it. `None` removes the text.
    pub(crate) fn write_value(
        &self,
        session: Session<'_>,
        converter: &Arc<dyn Converter>,
        value: Option<&Value>,
    ) -> Result<()> {
        session.check_write_access()?;
        let text = match value {
            Some(value) => {
                let cx = ConvertContext::new(session, self.tree_node(session)?);
                converter.to_text(value, &cx)?
            }
            None => None,
        };
        self.write_text(session, text.as_deref())
    }

    pub(crate) fn write_text(&self, session: Session<'_>, text: Option<&str>) -> Result<()> {
        session.check_write_access()?;
        let tree = session.tree();
        match (&self.location, text) {
            (Location::Attribute { parent, name }, Some(text)) => {
                let owner = session.handler(*parent)?.ensure_tag(session)?;
                tree.set_attribute(owner, name, Some(text))?;
            }
            (Location::Attribute { parent, name }, None) => {
                if let Some(TreeNode::Tag(owner)) = session.handler(*parent)?.tree_node(session)? {
                    tree.set_attribute(owner, name, None)?;
                }
            }
            (_, Some(text)) => {
                let key = self.ensure_tag(session)?;
                tree.set_text(key, Some(text))?;
            }
            (_, None) => {
                if let Some(TreeNode::Tag(key)) = self.tree_node(session)? {
                    tree.set_text(key, None)?;
                }
            }
        }
        trace!(handler = ?self.id, "value written");
        self.cache.clear();
        Ok(())
    }

    /// `Some("")` when the position exists, `None` otherwise.
    pub(crate) fn read_indicator(&self, session: Session<'_>) -> Result<Option<String>> {
        Ok(self.tree_node(session)?.map(|_| String::new()))
    }

    pub(crate) fn write_indicator(&self, session: Session<'_>, present: bool) -> Result<()> {
        session.check_write_access()?;
        let tree = session.tree();
        if present {
            match &self.location {
                Location::Attribute { parent, name } => {
                    let owner = session.handler(*parent)?.ensure_tag(session)?;
                    if tree.attribute(owner, name).is_none() {
                        tree.set_attribute(owner, name, Some(""))?;
                    }
                }
                _ => {
                    self.ensure_tag(session)?;
                }
            }
        } else {
            match self.tree_node(session)? {
                Some(TreeNode::Tag(key)) => tree.remove(key)?,
                Some(TreeNode::Attribute { owner, name }) => {
                    tree.set_attribute(owner, &name, None)?
                }
                None => {}
            }
        }
        self.cache.clear();
        Ok(())
    }

    /// The tag of this position, creating it and any missing ancestors.
    pub(crate) fn ensure_tag(&self, session: Session<'_>) -> Result<NodeKey> {
        session.check_alive()?;
        let tree = session.tree();
        match &self.location {
            Location::Node(key) => {
                if tree.is_valid(*key) {
                    Ok(*key)
                } else {
                    Err(Error::stale(format!("tree node {key:?} was removed")))
                }
            }
            Location::Fixed {
                parent,
                name,
                index,
            } => {
                let owner = session.handler(*parent)?.ensure_tag(session)?;
                let existing = tree.children_by_name(owner, name);
                if let Some(key) = existing.get(*index) {
                    return Ok(*key);
                }
                let mut created = tree.create_child(owner, name)?;
                for _ in existing.len()..*index {
                    created = tree.create_child(owner, name)?;
                }
                Ok(created)
            }
            Location::Attribute { name, .. } => Err(Error::TypeMismatch {
                expected: "tag".to_owned(),
                found: format!("attribute `{name}`"),
            }),
        }
    }

    /// Handler for the `index`-th child named `name`, virtual if it is missing.
    ///
    /// The handler keeps its identity when the child is created later.
    pub(crate) fn fixed_child(
        &self,
        session: Session<'_>,
        name: &str,
        index: usize,
        interface: Option<Arc<ViewInterface>>,
    ) -> Result<HandlerId> {
        let interface_name = interface.as_ref().map(|i| i.name().to_owned());
        let key = HandlerKey::Fixed {
            parent: self.id,
            name: name.to_owned(),
            index,
            interface: interface_name.clone(),
        };
        let existing = match self.tree_node(session)? {
            Some(TreeNode::Tag(owner)) => {
                session.tree().children_by_name(owner, name).get(index).copied()
            }
            _ => None,
        };
        let found = session.generation.lookup(&key);
        if let Some(id) = found {
            match (session.handler(id)?.location(), existing) {
                (Location::Fixed { .. }, _) => return Ok(id),
                (Location::Node(node), Some(current)) if *node == current => return Ok(id),
                _ => {}
            }
        }
        if let Some(node) = existing {
            let node_key = HandlerKey::Node(node, interface_name.clone());
            if let Some(id) = session.generation.lookup(&node_key) {
                if session.resolves_to(id, node) {
                    return Ok(session.generation.alias(key, id));
                }
            }
        }
        let location = Location::Fixed {
            parent: self.id,
            name: name.to_owned(),
            index,
        };
        let make = |id| NodeHandler::new(id, location, interface);
        let id = match found {
            Some(_) => session.generation.replace(key, make),
            None => session.generation.intern(key, make),
        };
        if let Some(node) = existing {
            session
                .generation
                .alias(HandlerKey::Node(node, interface_name), id);
        }
        Ok(id)
    }

    /// Handlers of the children named `name`, in document order.
    pub(crate) fn collection_children(
        &self,
        session: Session<'_>,
        name: &str,
        interface: Option<&Arc<ViewInterface>>,
    ) -> Result<Vec<HandlerId>> {
        match self.tree_node(session)? {
            Some(TreeNode::Tag(owner)) => Ok(session
                .tree()
                .children_by_name(owner, name)
                .into_iter()
                .map(|key| session.node_handler(key, interface.cloned()))
                .collect()),
            _ => Ok(Vec::new()),
        }
    }

    /// Appends a new child tag named `name`.
    pub(crate) fn add_child(
        &self,
        session: Session<'_>,
        name: &str,
        interface: Option<&Arc<ViewInterface>>,
    ) -> Result<HandlerId> {
        session.check_write_access()?;
        let owner = self.ensure_tag(session)?;
        let key = session.tree().create_child(owner, name)?;
        Ok(session.node_handler(key, interface.cloned()))
    }

    pub(crate) fn attribute_handler(&self, session: Session<'_>, name: &str) -> HandlerId {
        let key = HandlerKey::Attribute {
            parent: self.id,
            name: name.to_owned(),
        };
        let location = Location::Attribute {
            parent: self.id,
            name: name.to_owned(),
        };
        session
            .generation
            .intern(key, |id| NodeHandler::new(id, location, None))
    }
}

/// The form of `value` kept in a value cache: views are stored weakly so the
/// arena never owns its own document.
fn detach(value: &Value) -> Value {
    match value.downcast_ref::<View>() {
        Some(view) => Arc::new(view.downgrade()) as Value,
        None => value.clone(),
    }
}
