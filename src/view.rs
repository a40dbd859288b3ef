//! Typed views.
//!
//! A [`View`] is a cheap handle to one node handler of one document
//! generation. Typed views are newtypes over [`View`] declared with
//! [`typed_view!`](crate::typed_view), which ties the type to its
//! [`ViewInterface`] descriptor.
//!
//! ```
//! use std::sync::Arc;
//! use tagbind::{BindingEngine, MemoryTree, MethodDecl, TypedView, ValueType, View, ViewInterface};
//!
//! #[derive(Clone)]
//! struct Widget(View);
//!
//! tagbind::typed_view!(
//!     Widget,
//!     ViewInterface::builder("Widget")
//!         .tag("widget")
//!         .method(MethodDecl::getter("getName", ValueType::text()))
//!         .method(MethodDecl::getter("getWidgets", ValueType::views::<Widget>()))
//!         .build()
//! );
//!
//! impl Widget {
//!     fn name(&self) -> tagbind::Result<Option<String>> {
//!         self.0.get("getName")
//!     }
//!
//!     fn widgets(&self) -> tagbind::Result<Vec<Widget>> {
//!         self.0.children("getWidgets")
//!     }
//! }
//!
//! let tree = Arc::new(MemoryTree::parse("ui", r#"<widget name="A"><widget name="B"/></widget>"#).unwrap());
//! let binding = BindingEngine::new().bind(tree);
//! let root: Widget = binding.root().unwrap();
//! assert_eq!(root.name().unwrap().as_deref(), Some("A"));
//! assert_eq!(root.widgets().unwrap()[0].name().unwrap().as_deref(), Some("B"));
//! ```

use std::{
    any::Any,
    fmt,
    hash::{Hash, Hasher},
    sync::{Arc, Weak},
};

use crate::{
    Converter, DocumentBinding, Error, Result, TreeNode, Value, ViewInterface,
    generation::{Generation, HandlerId},
    handler::{NodeHandler, Session},
};

/// Result of a view method call.
#[derive(Debug)]
pub enum Outcome {
    Unit,
    Value(Option<Value>),
    Flag(bool),
    View(View),
    Views(Vec<View>),
}

impl Outcome {
    fn kind(&self) -> &'static str {
        match self {
            Self::Unit => "unit",
            Self::Value(_) => "value",
            Self::Flag(_) => "flag",
            Self::View(_) => "view",
            Self::Views(_) => "view list",
        }
    }

    fn mismatch(&self, expected: &str) -> Error {
        Error::TypeMismatch {
            expected: expected.to_owned(),
            found: self.kind().to_owned(),
        }
    }

    pub fn into_value(self) -> Result<Option<Value>> {
        match self {
            Self::Value(value) => Ok(value),
            other => Err(other.mismatch("value")),
        }
    }

    pub fn into_flag(self) -> Result<bool> {
        match self {
            Self::Flag(flag) => Ok(flag),
            other => Err(other.mismatch("flag")),
        }
    }

    pub fn into_view(self) -> Result<View> {
        match self {
            Self::View(view) => Ok(view),
            other => Err(other.mismatch("view")),
        }
    }

    pub fn into_views(self) -> Result<Vec<View>> {
        match self {
            Self::Views(views) => Ok(views),
            other => Err(other.mismatch("view list")),
        }
    }
}

/// Conversion from an untyped [`View`].
pub trait FromView: Sized {
    fn from_view(view: View) -> Result<Self>;
}

impl FromView for View {
    #[inline]
    fn from_view(view: View) -> Result<Self> {
        Ok(view)
    }
}

/// A view type bound to a fixed interface descriptor.
pub trait TypedView: FromView + Clone {
    /// The descriptor, built once per process.
    fn interface() -> Arc<ViewInterface>;

    fn as_view(&self) -> &View;
}

/// Implements [`FromView`] and [`TypedView`] for a newtype over [`View`].
///
/// The second argument builds the interface descriptor; it is evaluated once.
#[macro_export]
macro_rules! typed_view {
    ($ty:ident, $interface:expr $(,)?) => {
        impl $crate::FromView for $ty {
            fn from_view(view: $crate::View) -> $crate::Result<Self> {
                let expected = <Self as $crate::TypedView>::interface();
                match view.interface() {
                    Some(found) if found.name() == expected.name() => Ok(Self(view)),
                    found => Err($crate::Error::TypeMismatch {
                        expected: expected.name().to_owned(),
                        found: found.map_or_else(|| "<value>".to_owned(), |i| i.name().to_owned()),
                    }),
                }
            }
        }

        impl $crate::TypedView for $ty {
            fn interface() -> ::std::sync::Arc<$crate::ViewInterface> {
                static INTERFACE: ::std::sync::OnceLock<::std::sync::Arc<$crate::ViewInterface>> =
                    ::std::sync::OnceLock::new();
                INTERFACE.get_or_init(|| $interface).clone()
            }

            fn as_view(&self) -> &$crate::View {
                &self.0
            }
        }
    };
}

/// Handle to a node handler of one document generation.
///
/// Two views are equal when they belong to the same generation and either
/// share a handler or resolve to the same tree position. The hash follows
/// the tree position too, so a view whose node goes away changes its hash.
#[derive(Clone)]
pub struct View {
    binding: Arc<DocumentBinding>,
    generation: Arc<Generation>,
    id: HandlerId,
}

impl View {
    pub(crate) fn new(binding: Arc<DocumentBinding>, generation: Arc<Generation>, id: HandlerId) -> Self {
        Self {
            binding,
            generation,
            id,
        }
    }

    #[inline]
    pub(crate) fn session(&self) -> Session<'_> {
        Session::new(&self.binding, &self.generation)
    }

    fn handler(&self) -> Result<Arc<NodeHandler>> {
        self.session().handler(self.id)
    }

    pub(crate) fn downgrade(&self) -> WeakView {
        WeakView {
            binding: Arc::downgrade(&self.binding),
            generation: Arc::downgrade(&self.generation),
            id: self.id,
        }
    }

    #[inline]
    pub fn id(&self) -> HandlerId {
        self.id
    }

    #[inline]
    pub fn binding(&self) -> &Arc<DocumentBinding> {
        &self.binding
    }

    /// The interface this view was bound through; `None` for value views.
    pub fn interface(&self) -> Option<Arc<ViewInterface>> {
        self.generation
            .get(self.id)
            .and_then(|handler| handler.interface().cloned())
    }

    /// Returns `false` once the tree position or the whole generation died.
    pub fn is_valid(&self) -> bool {
        self.tree_node().is_ok()
    }

    /// Returns `true` if the tree position currently exists.
    pub fn exists(&self) -> Result<bool> {
        Ok(self.tree_node()?.is_some())
    }

    pub fn tree_node(&self) -> Result<Option<TreeNode>> {
        self.handler()?.tree_node(self.session())
    }

    pub fn raw_text(&self) -> Result<Option<String>> {
        self.handler()?.raw_text(self.session())
    }

    pub fn tag_name(&self) -> Result<Option<String>> {
        self.handler()?.tag(self.session())
    }

    pub fn invoke(&self, method: &str, args: &[Value]) -> Result<Outcome> {
        let handler = self.handler()?;
        self.binding
            .engine()
            .dispatch()
            .dispatch(self.session(), &handler, method, args)
    }

    pub fn get_value(&self, method: &str) -> Result<Option<Value>> {
        self.invoke(method, &[])?.into_value()
    }

    pub fn get<T: Any + Send + Sync + Clone>(&self, method: &str) -> Result<Option<T>> {
        match self.get_value(method)? {
            Some(value) => downcast(&value).map(Some),
            None => Ok(None),
        }
    }

    /// Calls a setter; `None` removes the value.
    pub fn set_value(&self, method: &str, value: Option<Value>) -> Result<()> {
        let args: Vec<Value> = value.into_iter().collect();
        self.invoke(method, &args)?;
        Ok(())
    }

    pub fn set<T: Any + Send + Sync>(&self, method: &str, value: Option<T>) -> Result<()> {
        self.set_value(method, value.map(|v| Arc::new(v) as Value))
    }

    pub fn child<V: FromView>(&self, method: &str) -> Result<V> {
        V::from_view(self.invoke(method, &[])?.into_view()?)
    }

    pub fn children<V: FromView>(&self, method: &str) -> Result<Vec<V>> {
        self.invoke(method, &[])?
            .into_views()?
            .into_iter()
            .map(V::from_view)
            .collect()
    }

    /// Calls an adder, returning the new child.
    pub fn add<V: FromView>(&self, method: &str) -> Result<V> {
        self.child(method)
    }

    pub fn flag(&self, method: &str) -> Result<bool> {
        self.invoke(method, &[])?.into_flag()
    }

    pub fn set_flag(&self, method: &str, present: bool) -> Result<()> {
        self.invoke(method, &[Arc::new(present) as Value])?;
        Ok(())
    }

    /// Calls a getter whose value refers to another view.
    pub fn reference<V: FromView>(&self, method: &str) -> Result<Option<V>> {
        match self.get_value(method)? {
            Some(value) => V::from_view(downcast::<View>(&value)?).map(Some),
            None => Ok(None),
        }
    }

    pub fn cast<V: FromView>(&self) -> Result<V> {
        V::from_view(self.clone())
    }

    /// Reads the text of this position through `converter`.
    pub fn read_value(&self, converter: &Arc<dyn Converter>) -> Result<Option<Value>> {
        self.handler()?.read_value(self.session(), converter)
    }

    /// Writes `value` through `converter`; `None` removes the text.
    ///
    /// Must run inside the tree's exclusive mutation scope.
    pub fn write_value(&self, converter: &Arc<dyn Converter>, value: Option<&Value>) -> Result<()> {
        self.handler()?.write_value(self.session(), converter, value)
    }

    pub fn fixed_child(
        &self,
        name: &str,
        index: usize,
        interface: Option<&Arc<ViewInterface>>,
    ) -> Result<View> {
        if let Some(interface) = interface {
            self.binding.engine().register_interface(interface)?;
        }
        let session = self.session();
        let id = self
            .handler()?
            .fixed_child(session, name, index, interface.cloned())?;
        Ok(session.view(id))
    }

    pub fn collection_children(
        &self,
        name: &str,
        interface: Option<&Arc<ViewInterface>>,
    ) -> Result<Vec<View>> {
        if let Some(interface) = interface {
            self.binding.engine().register_interface(interface)?;
        }
        let session = self.session();
        Ok(self
            .handler()?
            .collection_children(session, name, interface)?
            .into_iter()
            .map(|id| session.view(id))
            .collect())
    }

    /// Value view of an attribute of this view's tag.
    pub fn attribute(&self, name: &str) -> Result<View> {
        let session = self.session();
        let id = self.handler()?.attribute_handler(session, name);
        Ok(session.view(id))
    }

    /// `Some("")` if the position exists, `None` otherwise.
    pub fn read_indicator(&self) -> Result<Option<String>> {
        self.handler()?.read_indicator(self.session())
    }

    pub fn cached_value_count(&self) -> Result<usize> {
        Ok(self.handler()?.cached_value_count())
    }
}

/// A view that does not keep its document alive.
///
/// Values held by a handler's cache live inside the document's own arena, so
/// views among them are stored in this form.
pub(crate) struct WeakView {
    binding: Weak<DocumentBinding>,
    generation: Weak<Generation>,
    id: HandlerId,
}

impl WeakView {
    pub(crate) fn upgrade(&self) -> Option<View> {
        Some(View::new(
            self.binding.upgrade()?,
            self.generation.upgrade()?,
            self.id,
        ))
    }
}

fn downcast<T: Any + Clone>(value: &Value) -> Result<T> {
    value
        .downcast_ref::<T>()
        .cloned()
        .ok_or_else(|| Error::TypeMismatch {
            expected: std::any::type_name::<T>().to_owned(),
            found: "another value type".to_owned(),
        })
}

impl PartialEq for View {
    fn eq(&self, other: &Self) -> bool {
        if !Arc::ptr_eq(&self.generation, &other.generation) {
            return false;
        }
        if self.id == other.id {
            return true;
        }
        match (self.tree_node(), other.tree_node()) {
            (Ok(Some(a)), Ok(Some(b))) => a == b,
            _ => false,
        }
    }
}

impl Eq for View {}

impl Hash for View {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.generation).hash(state);
        match self.tree_node() {
            Ok(Some(node)) => node.hash(state),
            _ => self.id.hash(state),
        }
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("View");
        s.field("id", &self.id)
            .field("epoch", &self.generation.epoch());
        if let Some(interface) = self.interface() {
            s.field("interface", &interface.name());
        }
        s.finish()
    }
}
