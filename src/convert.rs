//! Text to value conversion.
//!
//! A [`Converter`] turns the raw text of a tree position into a typed
//! [`Value`] and back. Most converters are written against the strongly typed
//! [`TypedConverter`] trait and wrapped in [`Typed`]; the type-erased
//! [`Converter`] is what the registry, the dispatcher and the value cache
//! work with.
//!
//! # Example
//!
//! ```
//! use tagbind::{ConvertContext, ConverterRegistry, Result, TypedConverter, ValueType};
//!
//! #[derive(Default)]
//! struct Percent;
//!
//! impl TypedConverter for Percent {
//!     type Target = u8;
//!
//!     fn parse(&self, text: &str, _cx: &ConvertContext<'_>) -> Result<Option<u8>> {
//!         Ok(text.trim().strip_suffix('%').and_then(|n| n.parse().ok()))
//!     }
//!
//!     fn render(&self, value: &u8, _cx: &ConvertContext<'_>) -> Result<Option<String>> {
//!         Ok(Some(format!("{value}%")))
//!     }
//! }
//!
//! let registry = ConverterRegistry::with_defaults();
//! registry.register(Percent);
//! let converter = registry.resolve(&ValueType::of::<u8>()).unwrap();
//! let cx = ConvertContext::standalone();
//! let value = converter.from_text("42%", &cx).unwrap().unwrap();
//! assert_eq!(value.downcast_ref::<u8>(), Some(&42));
//! ```

mod builtin;
mod context;
mod enums;
mod reference;
mod registry;

use std::{
    any::{Any, TypeId},
    fmt,
    sync::Arc,
};

pub use builtin::{BoolConverter, FromStrConverter, TextConverter};
pub use context::{CancellationToken, ContextProvider, ConvertContext, DocumentContext, Scope};
pub use enums::{EnumConverter, NamedEnum};
pub use reference::ReferenceConverter;
pub use registry::ConverterRegistry;

use crate::{Error, Result};

/// A converted value.
///
/// Values are shared: two reads served from the value cache return the same
/// allocation.
pub type Value = Arc<dyn Any + Send + Sync>;

/// Type-erased bidirectional conversion between text and a value.
pub trait Converter: Send + Sync + 'static {
    /// Converts text into a value. `Ok(None)` means "no value".
    fn from_text(&self, text: &str, cx: &ConvertContext<'_>) -> Result<Option<Value>>;

    /// Converts a value into text. `Ok(None)` removes the text.
    fn to_text(&self, value: &Value, cx: &ConvertContext<'_>) -> Result<Option<String>>;

    /// Name of the produced type, for diagnostics.
    fn target(&self) -> &str;

    /// Identity of the converter implementation.
    fn class(&self) -> TypeId {
        TypeId::of::<Self>()
    }
}

/// Strongly typed converter; wrap it in [`Typed`] to use it as a [`Converter`].
pub trait TypedConverter: Send + Sync + 'static {
    type Target: Any + Send + Sync;

    fn parse(&self, text: &str, cx: &ConvertContext<'_>) -> Result<Option<Self::Target>>;

    fn render(&self, value: &Self::Target, cx: &ConvertContext<'_>) -> Result<Option<String>>;
}

/// Adapter from [`TypedConverter`] to [`Converter`].
#[derive(Clone, Copy, Debug, Default)]
pub struct Typed<C>(pub C);

impl<C: TypedConverter> Converter for Typed<C> {
    fn from_text(&self, text: &str, cx: &ConvertContext<'_>) -> Result<Option<Value>> {
        Ok(self.0.parse(text, cx)?.map(|v| Arc::new(v) as Value))
    }

    fn to_text(&self, value: &Value, cx: &ConvertContext<'_>) -> Result<Option<String>> {
        match value.downcast_ref::<C::Target>() {
            Some(value) => self.0.render(value, cx),
            None => Err(Error::TypeMismatch {
                expected: std::any::type_name::<C::Target>().to_owned(),
                found: "another value type".to_owned(),
            }),
        }
    }

    fn target(&self) -> &str {
        std::any::type_name::<C::Target>()
    }
}

/// A converter implementation named at a call site, instantiated on demand.
#[derive(Clone)]
pub struct ConverterClass {
    id: TypeId,
    name: &'static str,
    make: fn() -> Arc<dyn Converter>,
}

impl ConverterClass {
    pub fn of<C: Converter + Default>() -> Self {
        Self {
            id: TypeId::of::<C>(),
            name: std::any::type_name::<C>(),
            make: make_default::<C>,
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

    pub(crate) fn instantiate(&self) -> Arc<dyn Converter> {
        (self.make)()
    }
}

impl fmt::Debug for ConverterClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConverterClass({})", self.name)
    }
}

fn make_default<C: Converter + Default>() -> Arc<dyn Converter> {
    Arc::new(C::default())
}

pub(crate) fn enum_converter<E: NamedEnum>() -> Arc<dyn Converter> {
    Arc::new(Typed(EnumConverter::<E>::new()))
}

/// Identity of one converter instance, used as part of the value cache key.
#[inline]
pub(crate) fn instance_of(converter: &Arc<dyn Converter>) -> usize {
    Arc::as_ptr(converter) as *const () as usize
}
