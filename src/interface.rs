//! Descriptors of view interfaces.
//!
//! A [`ViewInterface`] plays the role of an interface declaration: a name, the
//! element name its views usually bind to, and a list of [`MethodDecl`]s with
//! their parameter/return [`ValueType`]s and [`Annotation`]s. The dispatcher
//! turns every declared method into an invocation strategy once, when the
//! interface is registered.
//!
//! ```
//! use tagbind::{Annotation, MethodDecl, ValueType, ViewInterface};
//!
//! let widget = ViewInterface::builder("Widget")
//!     .tag("widget")
//!     .method(MethodDecl::getter("getName", ValueType::text()))
//!     .method(MethodDecl::getter("getCount", ValueType::of::<i32>()))
//!     .method(
//!         MethodDecl::getter("getChildren", ValueType::views_named("Widget"))
//!             .with(Annotation::sub_tag_list("widget")),
//!     )
//!     .build();
//! assert_eq!(widget.methods().len(), 3);
//! ```

use std::{
    any::{Any, TypeId},
    fmt,
    sync::Arc,
};

use crate::{
    config::NameStrategy,
    convert::{Converter, ConverterClass, NamedEnum},
    view::TypedView,
};

/// Identity of a Rust type used as a view value.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    #[inline]
    pub fn id(&self) -> TypeId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn is<T: Any>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Reference from a method to another view interface.
///
/// `Static` points at a typed view's descriptor function, which allows
/// self-referential interfaces. `Named` is resolved against the interfaces
/// registered with the dispatcher.
#[derive(Clone)]
pub enum InterfaceRef {
    Static(fn() -> Arc<ViewInterface>),
    Named(String),
}

impl InterfaceRef {
    pub fn name(&self) -> String {
        match self {
            Self::Static(describe) => describe().name().to_owned(),
            Self::Named(name) => name.clone(),
        }
    }
}

impl fmt::Debug for InterfaceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(_) => f.write_str("Static(..)"),
            Self::Named(name) => write!(f, "Named({name:?})"),
        }
    }
}

/// Parameter or return type of a view method.
#[derive(Clone)]
pub enum ValueType {
    Void,
    /// A value converted from text by a registered converter.
    Scalar(TypeKey),
    /// A [`NamedEnum`] converted by the enumeration auto-converter.
    Enum {
        key: TypeKey,
        converter: fn() -> Arc<dyn Converter>,
    },
    /// A value naming another view of the document.
    Reference(InterfaceRef),
    /// A single child view.
    View(InterfaceRef),
    /// A repeatable list of child views.
    ViewList(InterfaceRef),
}

impl ValueType {
    pub fn of<T: Any + Send + Sync>() -> Self {
        Self::Scalar(TypeKey::of::<T>())
    }

    pub fn text() -> Self {
        Self::of::<String>()
    }

    pub fn boolean() -> Self {
        Self::of::<bool>()
    }

    pub fn enumeration<E: NamedEnum>() -> Self {
        Self::Enum {
            key: TypeKey::of::<E>(),
            converter: crate::convert::enum_converter::<E>,
        }
    }

    pub fn reference<V: TypedView>() -> Self {
        Self::Reference(InterfaceRef::Static(V::interface))
    }

    pub fn reference_named(interface: impl Into<String>) -> Self {
        Self::Reference(InterfaceRef::Named(interface.into()))
    }

    pub fn view<V: TypedView>() -> Self {
        Self::View(InterfaceRef::Static(V::interface))
    }

    pub fn view_named(interface: impl Into<String>) -> Self {
        Self::View(InterfaceRef::Named(interface.into()))
    }

    pub fn views<V: TypedView>() -> Self {
        Self::ViewList(InterfaceRef::Static(V::interface))
    }

    pub fn views_named(interface: impl Into<String>) -> Self {
        Self::ViewList(InterfaceRef::Named(interface.into()))
    }

    /// Returns `true` for types carried as converted values.
    pub fn is_value(&self) -> bool {
        matches!(
            self,
            Self::Scalar(_) | Self::Enum { .. } | Self::Reference(_)
        )
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Self::Scalar(key) if key.is::<bool>())
    }

    pub fn type_name(&self) -> String {
        match self {
            Self::Void => "()".to_owned(),
            Self::Scalar(key) | Self::Enum { key, .. } => key.name().to_owned(),
            Self::Reference(iface) => format!("&{}", iface.name()),
            Self::View(iface) => iface.name(),
            Self::ViewList(iface) => format!("[{}]", iface.name()),
        }
    }
}

impl fmt::Debug for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.type_name())
    }
}

/// Binding annotations attached to a method declaration.
#[derive(Clone, Debug)]
pub enum Annotation {
    /// A statically named child tag at an ordinal.
    SubTag { name: String, index: usize },
    /// Repeatable child tags with the given name.
    SubTagList { name: String },
    /// An attribute of the view's own tag.
    Attribute { name: String },
    /// The text of the view's own tag.
    TagValue,
    /// Presence/absence semantics instead of textual content.
    Indicator,
    /// Explicit converter for this call site.
    Convert(ConverterClass),
    /// Fall back to passthrough text when no converter matches.
    Lenient,
}

impl Annotation {
    pub fn sub_tag(name: impl Into<String>) -> Self {
        Self::SubTag {
            name: name.into(),
            index: 0,
        }
    }

    pub fn sub_tag_at(name: impl Into<String>, index: usize) -> Self {
        Self::SubTag {
            name: name.into(),
            index,
        }
    }

    pub fn sub_tag_list(name: impl Into<String>) -> Self {
        Self::SubTagList { name: name.into() }
    }

    pub fn attribute(name: impl Into<String>) -> Self {
        Self::Attribute { name: name.into() }
    }

    pub fn convert<C: Converter + Default>() -> Self {
        Self::Convert(ConverterClass::of::<C>())
    }

    /// [`Annotation::convert`] for a [`TypedConverter`](crate::TypedConverter).
    pub fn convert_typed<C: crate::TypedConverter + Default>() -> Self {
        Self::Convert(ConverterClass::of::<crate::Typed<C>>())
    }
}

/// Declaration of one view method.
#[derive(Clone, Debug)]
pub struct MethodDecl {
    name: String,
    params: Vec<ValueType>,
    returns: ValueType,
    annotations: Vec<Annotation>,
}

impl MethodDecl {
    pub fn new(name: impl Into<String>, params: Vec<ValueType>, returns: ValueType) -> Self {
        Self {
            name: name.into(),
            params,
            returns,
            annotations: Vec::new(),
        }
    }

    /// `fn name() -> returns`
    pub fn getter(name: impl Into<String>, returns: ValueType) -> Self {
        Self::new(name, Vec::new(), returns)
    }

    /// `fn name(param)`
    pub fn setter(name: impl Into<String>, param: ValueType) -> Self {
        Self::new(name, vec![param], ValueType::Void)
    }

    /// `fn name() -> View`, appending a new child.
    pub fn adder(name: impl Into<String>, returns: ValueType) -> Self {
        Self::new(name, Vec::new(), returns)
    }

    pub fn with(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn params(&self) -> &[ValueType] {
        &self.params
    }

    #[inline]
    pub fn returns(&self) -> &ValueType {
        &self.returns
    }

    #[inline]
    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub(crate) fn sub_tag(&self) -> Option<(&str, usize)> {
        self.annotations.iter().find_map(|a| match a {
            Annotation::SubTag { name, index } => Some((name.as_str(), *index)),
            _ => None,
        })
    }

    pub(crate) fn sub_tag_list(&self) -> Option<&str> {
        self.annotations.iter().find_map(|a| match a {
            Annotation::SubTagList { name } => Some(name.as_str()),
            _ => None,
        })
    }

    pub(crate) fn attribute(&self) -> Option<&str> {
        self.annotations.iter().find_map(|a| match a {
            Annotation::Attribute { name } => Some(name.as_str()),
            _ => None,
        })
    }

    pub(crate) fn converter_override(&self) -> Option<&ConverterClass> {
        self.annotations.iter().find_map(|a| match a {
            Annotation::Convert(class) => Some(class),
            _ => None,
        })
    }

    pub(crate) fn has_tag_value(&self) -> bool {
        self.annotations
            .iter()
            .any(|a| matches!(a, Annotation::TagValue))
    }

    pub(crate) fn is_indicator(&self) -> bool {
        self.annotations
            .iter()
            .any(|a| matches!(a, Annotation::Indicator))
    }

    pub(crate) fn is_lenient(&self) -> bool {
        self.annotations.iter().any(|a| matches!(a, Annotation::Lenient))
    }
}

/// Declaration of a view interface.
#[derive(Debug)]
pub struct ViewInterface {
    name: String,
    tag: Option<String>,
    name_attribute: String,
    name_strategy: Option<NameStrategy>,
    methods: Vec<MethodDecl>,
}

impl ViewInterface {
    pub fn builder(name: impl Into<String>) -> ViewInterfaceBuilder {
        ViewInterfaceBuilder {
            inner: ViewInterface {
                name: name.into(),
                tag: None,
                name_attribute: "name".to_owned(),
                name_strategy: None,
                methods: Vec::new(),
            },
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Element name views of this interface usually bind to.
    #[inline]
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Attribute holding the name by which other views reference this one.
    #[inline]
    pub fn name_attribute(&self) -> &str {
        &self.name_attribute
    }

    #[inline]
    pub fn name_strategy(&self) -> Option<NameStrategy> {
        self.name_strategy
    }

    #[inline]
    pub fn methods(&self) -> &[MethodDecl] {
        &self.methods
    }

    pub fn method(&self, name: &str) -> Option<&MethodDecl> {
        self.methods.iter().find(|m| m.name == name)
    }
}

pub struct ViewInterfaceBuilder {
    inner: ViewInterface,
}

impl ViewInterfaceBuilder {
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.inner.tag = Some(tag.into());
        self
    }

    pub fn name_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.inner.name_attribute = attribute.into();
        self
    }

    pub fn name_strategy(mut self, strategy: NameStrategy) -> Self {
        self.inner.name_strategy = Some(strategy);
        self
    }

    pub fn method(mut self, method: MethodDecl) -> Self {
        self.inner.methods.push(method);
        self
    }

    pub fn build(self) -> Arc<ViewInterface> {
        Arc::new(self.inner)
    }
}
