use std::marker::PhantomData;

use crate::{ConvertContext, Error, Result, TypedConverter};

/// An enumeration with a fixed textual form for every variant.
///
/// Implement it with [`named_enum!`](crate::named_enum) and declare values with
/// [`ValueType::enumeration`](crate::ValueType::enumeration) to get the
/// enumeration auto-converter.
pub trait NamedEnum: Copy + PartialEq + Send + Sync + 'static {
    fn variants() -> &'static [Self];

    fn text(self) -> &'static str;
}

/// Implements [`NamedEnum`] for a field-less enum.
///
/// ```
/// #[derive(Clone, Copy, Debug, PartialEq)]
/// enum Scope {
///     Compile,
///     Test,
/// }
///
/// tagbind::named_enum!(Scope {
///     Compile => "compile",
///     Test => "test",
/// });
///
/// use tagbind::NamedEnum;
/// assert_eq!(Scope::Test.text(), "test");
/// assert_eq!(Scope::variants().len(), 2);
/// ```
#[macro_export]
macro_rules! named_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $crate::NamedEnum for $ty {
            fn variants() -> &'static [Self] {
                &[$($ty::$variant),+]
            }

            fn text(self) -> &'static str {
                match self {
                    $($ty::$variant => $text),+
                }
            }
        }
    };
}

/// Converter matching the exact textual form of a [`NamedEnum`] variant.
pub struct EnumConverter<E>(PhantomData<fn() -> E>);

impl<E> EnumConverter<E> {
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<E> Default for EnumConverter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: NamedEnum> TypedConverter for EnumConverter<E> {
    type Target = E;

    fn parse(&self, text: &str, _cx: &ConvertContext<'_>) -> Result<Option<E>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        E::variants()
            .iter()
            .copied()
            .find(|variant| variant.text() == text)
            .map(Some)
            .ok_or_else(|| {
                Error::conversion(text, std::any::type_name::<E>(), "unknown variant")
            })
    }

    fn render(&self, value: &E, _cx: &ConvertContext<'_>) -> Result<Option<String>> {
        Ok(Some(value.text().to_owned()))
    }
}
