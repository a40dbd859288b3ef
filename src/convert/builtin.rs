use std::{fmt::Display, marker::PhantomData, str::FromStr};

use crate::{ConvertContext, Error, Result, TypedConverter};

/// Passthrough converter for raw text.
#[derive(Clone, Copy, Debug, Default)]
pub struct TextConverter;

impl TypedConverter for TextConverter {
    type Target = String;

    #[inline]
    fn parse(&self, text: &str, _cx: &ConvertContext<'_>) -> Result<Option<String>> {
        Ok(Some(text.to_owned()))
    }

    #[inline]
    fn render(&self, value: &String, _cx: &ConvertContext<'_>) -> Result<Option<String>> {
        Ok(Some(value.clone()))
    }
}

/// `true`/`false`, ignoring ASCII case and surrounding whitespace.
#[derive(Clone, Copy, Debug, Default)]
pub struct BoolConverter;

impl TypedConverter for BoolConverter {
    type Target = bool;

    fn parse(&self, text: &str, _cx: &ConvertContext<'_>) -> Result<Option<bool>> {
        let text = text.trim();
        if text.is_empty() {
            Ok(None)
        } else if text.eq_ignore_ascii_case("true") {
            Ok(Some(true))
        } else if text.eq_ignore_ascii_case("false") {
            Ok(Some(false))
        } else {
            Err(Error::conversion(text, "bool", "expected `true` or `false`"))
        }
    }

    fn render(&self, value: &bool, _cx: &ConvertContext<'_>) -> Result<Option<String>> {
        Ok(Some(value.to_string()))
    }
}

/// Converter for any type with [`FromStr`] and [`Display`].
///
/// Surrounding whitespace is ignored and blank text means "no value". The
/// conversion is lossy for non-canonical literals: `+07` reads as `7` and is
/// written back as `7`.
pub struct FromStrConverter<T>(PhantomData<fn() -> T>);

impl<T> FromStrConverter<T> {
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for FromStrConverter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TypedConverter for FromStrConverter<T>
where
    T: FromStr + Display + Send + Sync + 'static,
    T::Err: Display,
{
    type Target = T;

    fn parse(&self, text: &str, _cx: &ConvertContext<'_>) -> Result<Option<T>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        text.parse::<T>()
            .map(Some)
            .map_err(|e| Error::conversion(text, std::any::type_name::<T>(), e))
    }

    fn render(&self, value: &T, _cx: &ConvertContext<'_>) -> Result<Option<String>> {
        Ok(Some(value.to_string()))
    }
}
