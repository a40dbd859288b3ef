//! Binding engines and document bindings.
//!
//! A [`BindingEngine`] owns the converter registry, the dispatch tables and
//! the configuration; it is shared by any number of documents. A
//! [`DocumentBinding`] attaches an engine to one tree and hands out views.
//!
//! ```
//! use tagbind::{BindingEngine, MemoryTree, MethodDecl, ValueType, ViewInterface};
//!
//! let tree = std::sync::Arc::new(MemoryTree::parse("doc", r#"<project version="3"/>"#).unwrap());
//! let project = ViewInterface::builder("Project")
//!     .method(MethodDecl::getter("getVersion", ValueType::of::<u32>()))
//!     .build();
//!
//! let binding = BindingEngine::new().bind(tree);
//! let root = binding.root_view(&project).unwrap();
//! assert_eq!(root.get::<u32>("getVersion").unwrap(), Some(3));
//! ```

use std::{
    borrow::Cow,
    sync::{Arc, RwLock},
};

use tracing::debug;

use crate::{
    BindingConfig, CancellationToken, ContextProvider, ConvertContext, ConverterRegistry,
    DocumentContext, Error, FromView, MutationScope, NodeKey, Reference, Result, StableHandle,
    StablePath, TextInjector, TreeError, TreeNode, TreeProvider, TypedView, View, ViewInterface,
    dispatch::DispatchTable,
    generation::Generation,
    handler::Session,
    stable::Revalidation,
    util::{read, write},
};

/// Converter registry, dispatch tables and configuration shared by bindings.
pub struct BindingEngine {
    registry: Arc<ConverterRegistry>,
    dispatch: DispatchTable,
    config: BindingConfig,
}

impl BindingEngine {
    pub fn new() -> Arc<Self> {
        Self::with_config(BindingConfig::default())
    }

    pub fn with_config(config: BindingConfig) -> Arc<Self> {
        Self::with_registry(Arc::new(ConverterRegistry::with_defaults()), config)
    }

    /// An engine over an existing registry, e.g. one shared with other engines.
    pub fn with_registry(registry: Arc<ConverterRegistry>, config: BindingConfig) -> Arc<Self> {
        Arc::new(Self {
            registry,
            dispatch: DispatchTable::new(),
            config,
        })
    }

    #[inline]
    pub fn registry(&self) -> &Arc<ConverterRegistry> {
        &self.registry
    }

    #[inline]
    pub fn dispatch(&self) -> &DispatchTable {
        &self.dispatch
    }

    #[inline]
    pub fn config(&self) -> &BindingConfig {
        &self.config
    }

    pub fn register<V: TypedView>(&self) -> Result<()> {
        self.register_interface(&V::interface())
    }

    pub fn register_interface(&self, interface: &Arc<ViewInterface>) -> Result<()> {
        self.dispatch
            .register(interface, &self.registry, self.config.name_strategy)
    }

    /// Binds a tree that is its own mutation scope.
    pub fn bind<T>(self: &Arc<Self>, tree: Arc<T>) -> Arc<DocumentBinding>
    where
        T: TreeProvider + MutationScope + 'static,
    {
        self.binding(tree.clone(), tree).build()
    }

    pub fn binding(
        self: &Arc<Self>,
        tree: Arc<dyn TreeProvider>,
        scope: Arc<dyn MutationScope>,
    ) -> DocumentBindingBuilder {
        DocumentBindingBuilder {
            engine: self.clone(),
            tree,
            scope,
            injectors: Vec::new(),
            context: Arc::new(DocumentContext),
            cancellation: CancellationToken::new(),
        }
    }
}

pub struct DocumentBindingBuilder {
    engine: Arc<BindingEngine>,
    tree: Arc<dyn TreeProvider>,
    scope: Arc<dyn MutationScope>,
    injectors: Vec<Arc<dyn TextInjector>>,
    context: Arc<dyn ContextProvider>,
    cancellation: CancellationToken,
}

impl DocumentBindingBuilder {
    /// Appends a text injector. Injectors run in the order they were added.
    pub fn injector(mut self, injector: impl TextInjector + 'static) -> Self {
        self.injectors.push(Arc::new(injector));
        self
    }

    pub fn context_provider(mut self, provider: impl ContextProvider + 'static) -> Self {
        self.context = Arc::new(provider);
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn build(self) -> Arc<DocumentBinding> {
        let epoch = self.tree.epoch();
        Arc::new(DocumentBinding {
            engine: self.engine,
            tree: self.tree,
            scope: self.scope,
            injectors: self.injectors,
            context: self.context,
            cancellation: self.cancellation,
            current: RwLock::new(Arc::new(Generation::new(epoch))),
        })
    }
}

/// One document bound to an engine.
///
/// Keeps the handler arena of the current generation and replaces it when
/// the tree reports a new epoch.
pub struct DocumentBinding {
    engine: Arc<BindingEngine>,
    tree: Arc<dyn TreeProvider>,
    scope: Arc<dyn MutationScope>,
    injectors: Vec<Arc<dyn TextInjector>>,
    context: Arc<dyn ContextProvider>,
    cancellation: CancellationToken,
    current: RwLock<Arc<Generation>>,
}

impl DocumentBinding {
    #[inline]
    pub fn engine(&self) -> &Arc<BindingEngine> {
        &self.engine
    }

    #[inline]
    pub fn tree(&self) -> &Arc<dyn TreeProvider> {
        &self.tree
    }

    #[inline]
    pub fn mutation_scope(&self) -> &Arc<dyn MutationScope> {
        &self.scope
    }

    #[inline]
    pub fn context_provider(&self) -> &Arc<dyn ContextProvider> {
        &self.context
    }

    #[inline]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Epoch of the current handler generation.
    pub fn generation_epoch(&self) -> u64 {
        self.generation().epoch()
    }

    /// The handler arena matching the tree's current epoch.
    pub(crate) fn generation(&self) -> Arc<Generation> {
        let epoch = self.tree.epoch();
        {
            let current = read(&self.current);
            if current.epoch() == epoch && current.is_alive() {
                return current.clone();
            }
        }
        let mut current = write(&self.current);
        if current.epoch() != epoch || !current.is_alive() {
            current.retire();
            debug!(
                document = %self.tree.document_name(),
                previous = current.epoch(),
                epoch,
                handlers = current.len(),
                "rebuilding handler generation"
            );
            *current = Arc::new(Generation::new(epoch));
        }
        current.clone()
    }

    /// Binds the root tag through `interface`.
    pub fn root_view(self: &Arc<Self>, interface: &Arc<ViewInterface>) -> Result<View> {
        if self.tree.is_disposed() {
            return Err(TreeError::Disposed(self.tree.document_name()).into());
        }
        self.engine.register_interface(interface)?;
        let root = self
            .tree
            .root()
            .ok_or_else(|| Error::MissingRoot(self.tree.document_name()))?;
        self.node_view(root, interface)
    }

    pub fn root<V: TypedView>(self: &Arc<Self>) -> Result<V> {
        V::from_view(self.root_view(&V::interface())?)
    }

    /// Binds an arbitrary tag through `interface`.
    pub fn node_view(self: &Arc<Self>, node: NodeKey, interface: &Arc<ViewInterface>) -> Result<View> {
        if !self.tree.is_valid(node) {
            return Err(Error::stale(format!("tree node {node:?} is not part of the document")));
        }
        self.engine.register_interface(interface)?;
        let generation = self.generation();
        let session = Session::new(self, &generation);
        Ok(session.view(session.node_handler(node, Some(interface.clone()))))
    }

    pub fn bind_node<V: TypedView>(self: &Arc<Self>, node: NodeKey) -> Result<V> {
        V::from_view(self.node_view(node, &V::interface())?)
    }

    /// A stable handle that re-locates `view` by its path after rebuilds.
    pub fn stable<V: TypedView>(self: &Arc<Self>, view: &V) -> Result<StableHandle<V>> {
        let path = StablePath::of(view.as_view())?;
        let binding = self.clone();
        Ok(StableHandle::new(Some(view.as_view().clone()), move || {
            if binding.tree.is_disposed() {
                return Revalidation::Gone;
            }
            match path.resolve(&binding) {
                Ok(Some(view)) => Revalidation::Found(view),
                Ok(None) => Revalidation::Missing,
                Err(e) => {
                    debug!(error = %e, "stable path did not resolve");
                    Revalidation::Missing
                }
            }
        }))
    }

    /// A stable handle with a caller supplied revalidation function.
    pub fn stable_with<V, F>(&self, view: Option<View>, revalidate: F) -> StableHandle<V>
    where
        V: FromView,
        F: Fn() -> Revalidation + Send + Sync + 'static,
    {
        StableHandle::new(view, revalidate)
    }

    /// References reported by the text injectors for the raw text of `view`.
    pub fn references(&self, view: &View) -> Result<Vec<Reference>> {
        let session = view.session();
        let Some(node) = view.tree_node()? else {
            return Ok(Vec::new());
        };
        let Some(raw) = self.tree.raw_text(&node) else {
            return Ok(Vec::new());
        };
        let cx = ConvertContext::new(session, Some(node));
        Ok(self
            .injectors
            .iter()
            .flat_map(|injector| injector.resolve_references(&raw, &cx))
            .collect())
    }

    /// Runs the text injectors over `raw` in order.
    pub(crate) fn inject(&self, raw: &str, node: &TreeNode, cx: &ConvertContext<'_>) -> String {
        let mut text = raw.to_owned();
        for injector in &self.injectors {
            let rewritten = match injector.rewrite(&text, node, cx) {
                Cow::Borrowed(_) => None,
                Cow::Owned(rewritten) => Some(rewritten),
            };
            if let Some(rewritten) = rewritten {
                text = rewritten;
            }
        }
        text
    }
}
