//! Handles that survive document rebuilds.
//!
//! A [`StableHandle`] wraps a view together with a revalidation function.
//! While the wrapped view is valid, calls go straight to it. Once the
//! document is rebuilt the handle re-locates the node, usually through a
//! [`StablePath`], and carries on with the replacement.
//!
//! ```text
//!  Valid --(view dies)--> Stale --(found)--> Valid
//!                           |
//!                           +--(missing)--> Detached --(found later)--> Valid
//!                           +--(gone)-----> Detached (permanent)
//! ```

use std::{
    fmt,
    hash::{Hash, Hasher},
    marker::PhantomData,
    sync::{Arc, Mutex},
};

use tracing::{debug, error};

use crate::{
    DocumentBinding, Error, FromView, NodeKey, Result, View, ViewInterface,
    generation::HandlerId,
    handler::{Location, Session},
    util::lock,
};

/// Outcome of one revalidation attempt.
pub enum Revalidation {
    /// The node was located again.
    Found(View),
    /// The node is not there now; later attempts may succeed.
    Missing,
    /// The node will never come back.
    Gone,
}

/// Lifecycle state of a [`StableHandle`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StableState {
    Valid,
    Stale,
    Detached,
}

struct Inner {
    state: StableState,
    current: Option<View>,
    last_good: Option<View>,
    permanent: bool,
}

/// A view reference that follows its node across document rebuilds.
pub struct StableHandle<V> {
    inner: Mutex<Inner>,
    revalidate: Box<dyn Fn() -> Revalidation + Send + Sync>,
    _marker: PhantomData<fn() -> V>,
}

impl<V: FromView> StableHandle<V> {
    pub fn new(
        view: Option<View>,
        revalidate: impl Fn() -> Revalidation + Send + Sync + 'static,
    ) -> Self {
        let state = if view.is_some() {
            StableState::Valid
        } else {
            StableState::Stale
        };
        Self {
            inner: Mutex::new(Inner {
                state,
                last_good: view.clone(),
                current: view,
                permanent: false,
            }),
            revalidate: Box::new(revalidate),
            _marker: PhantomData,
        }
    }

    fn ensure(&self, inner: &mut Inner) -> Option<View> {
        if let Some(view) = &inner.current {
            if view.is_valid() {
                inner.state = StableState::Valid;
                inner.last_good = Some(view.clone());
                return Some(view.clone());
            }
        }
        if inner.permanent {
            inner.state = StableState::Detached;
            return None;
        }
        if inner.state == StableState::Valid {
            debug!("stable handle went stale");
            inner.state = StableState::Stale;
        }
        self.attempt(inner)
    }

    fn attempt(&self, inner: &mut Inner) -> Option<View> {
        match (self.revalidate)() {
            Revalidation::Found(view) if view.is_valid() => {
                debug!(view = ?view, "stable handle revalidated");
                inner.current = Some(view.clone());
                inner.last_good = Some(view.clone());
                inner.state = StableState::Valid;
                Some(view)
            }
            Revalidation::Found(_) | Revalidation::Missing => {
                if inner.state != StableState::Detached {
                    debug!("stable handle detached");
                }
                inner.state = StableState::Detached;
                None
            }
            Revalidation::Gone => {
                debug!("stable handle permanently detached");
                inner.state = StableState::Detached;
                inner.permanent = true;
                None
            }
        }
    }

    /// The current view, revalidating it first if needed.
    pub fn view(&self) -> Result<View> {
        let mut inner = lock(&self.inner);
        match self.ensure(&mut inner) {
            Some(view) => Ok(view),
            None => {
                let detail = match &inner.last_good {
                    Some(view) => format!("{view:?} could not be re-located"),
                    None => "handle was never bound".to_owned(),
                };
                error!(%detail, "called on invalid stable handle");
                Err(Error::CalledOnInvalidStableHandle { detail })
            }
        }
    }

    pub fn get_current(&self) -> Result<V> {
        V::from_view(self.view()?)
    }

    pub fn is_valid(&self) -> bool {
        let mut inner = lock(&self.inner);
        self.ensure(&mut inner).is_some()
    }

    /// Drops the current view; the next access revalidates.
    pub fn invalidate(&self) {
        let mut inner = lock(&self.inner);
        inner.current = None;
        if inner.state == StableState::Valid {
            inner.state = StableState::Stale;
        }
    }

    /// Runs the revalidation function now, even if the current view is valid.
    pub fn revalidate(&self) -> bool {
        let mut inner = lock(&self.inner);
        if inner.permanent {
            return false;
        }
        self.attempt(&mut inner).is_some()
    }

    /// The state as of now, without attempting revalidation.
    pub fn state(&self) -> StableState {
        let inner = lock(&self.inner);
        match &inner.current {
            Some(view) if view.is_valid() => StableState::Valid,
            _ if inner.state == StableState::Valid => StableState::Stale,
            _ => inner.state,
        }
    }

    /// The last view this handle saw valid.
    pub fn last_known_good(&self) -> Option<View> {
        lock(&self.inner).last_good.clone()
    }

    fn identity(&self) -> Option<View> {
        let mut inner = lock(&self.inner);
        self.ensure(&mut inner).or_else(|| inner.last_good.clone())
    }
}

impl<V: FromView> PartialEq for StableHandle<V> {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        match (self.identity(), other.identity()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl<V: FromView> Eq for StableHandle<V> {}

impl<V: FromView> Hash for StableHandle<V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl<V> fmt::Debug for StableHandle<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("StableHandle")
            .field("state", &inner.state)
            .field("current", &inner.current)
            .finish()
    }
}

/// One step of a [`StablePath`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathStep {
    /// The root tag, by name.
    Root { name: String },
    /// The `position`-th child tag named `name`.
    Element { name: String, position: usize },
    /// A statically named child slot, which may be missing.
    Fixed { name: String, index: usize },
    Attribute { name: String },
}

#[derive(Clone, Debug)]
pub struct PathSegment {
    pub step: PathStep,
    /// Interface the handler at this step was bound through.
    pub interface: Option<Arc<ViewInterface>>,
}

/// Location of a view expressed independently of node keys.
#[derive(Clone, Debug)]
pub struct StablePath {
    segments: Vec<PathSegment>,
}

enum Cursor {
    Node(NodeKey, Option<Arc<ViewInterface>>),
    Handler(HandlerId),
}

impl StablePath {
    /// Records the path of a valid view.
    pub fn of(view: &View) -> Result<Self> {
        view.tree_node()?;
        let session = view.session();
        let mut segments = Vec::new();
        collect(session, view.id(), &mut segments)?;
        Ok(Self { segments })
    }

    #[inline]
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Locates the path in the binding's current generation.
    pub fn resolve(&self, binding: &Arc<DocumentBinding>) -> Result<Option<View>> {
        let generation = binding.generation();
        let session = Session::new(binding, &generation);
        let tree = session.tree();
        let mut cursor: Option<Cursor> = None;
        for segment in &self.segments {
            if let Some(interface) = &segment.interface {
                binding.engine().register_interface(interface)?;
            }
            let next = match (&segment.step, cursor.take()) {
                (PathStep::Root { name }, None) => match tree.root() {
                    Some(root) if tree.tag_name(root).as_deref() == Some(name.as_str()) => {
                        Cursor::Node(root, segment.interface.clone())
                    }
                    _ => return Ok(None),
                },
                (PathStep::Element { name, position }, Some(Cursor::Node(parent, _))) => {
                    match tree.children_by_name(parent, name).get(*position) {
                        Some(key) => Cursor::Node(*key, segment.interface.clone()),
                        None => return Ok(None),
                    }
                }
                (PathStep::Fixed { name, index }, Some(parent)) => {
                    let parent = session.handler(handler_of(session, parent))?;
                    Cursor::Handler(parent.fixed_child(
                        session,
                        name,
                        *index,
                        segment.interface.clone(),
                    )?)
                }
                (PathStep::Attribute { name }, Some(parent)) => {
                    let parent = session.handler(handler_of(session, parent))?;
                    Cursor::Handler(parent.attribute_handler(session, name))
                }
                _ => return Ok(None),
            };
            cursor = Some(next);
        }
        Ok(cursor.map(|cursor| session.view(handler_of(session, cursor))))
    }
}

fn handler_of(session: Session<'_>, cursor: Cursor) -> HandlerId {
    match cursor {
        Cursor::Node(key, interface) => session.node_handler(key, interface),
        Cursor::Handler(id) => id,
    }
}

fn collect(session: Session<'_>, id: HandlerId, out: &mut Vec<PathSegment>) -> Result<()> {
    let handler = session.handler(id)?;
    let interface = handler.interface().cloned();
    match handler.location() {
        Location::Node(key) => {
            let tree = session.tree();
            let mut chain = vec![*key];
            while let Some(parent) = chain.last().and_then(|last| tree.parent(*last)) {
                chain.push(parent);
            }
            chain.reverse();
            for (depth, node) in chain.iter().enumerate() {
                let name = tree
                    .tag_name(*node)
                    .ok_or_else(|| Error::stale(format!("tree node {node:?} has no name")))?;
                let step = match depth.checked_sub(1).map(|i| chain[i]) {
                    None => PathStep::Root { name },
                    Some(parent) => {
                        let position = tree
                            .children_by_name(parent, &name)
                            .iter()
                            .position(|sibling| sibling == node)
                            .unwrap_or(0);
                        PathStep::Element { name, position }
                    }
                };
                let interface = if depth + 1 == chain.len() {
                    interface.clone()
                } else {
                    None
                };
                out.push(PathSegment { step, interface });
            }
        }
        Location::Fixed {
            parent,
            name,
            index,
        } => {
            collect(session, *parent, out)?;
            out.push(PathSegment {
                step: PathStep::Fixed {
                    name: name.clone(),
                    index: *index,
                },
                interface,
            });
        }
        Location::Attribute { parent, name } => {
            collect(session, *parent, out)?;
            out.push(PathSegment {
                step: PathStep::Attribute { name: name.clone() },
                interface: None,
            });
        }
    }
    Ok(())
}
