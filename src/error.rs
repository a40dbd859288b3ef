//! Error types for binding, conversion and dispatch operations.
//!
//! This module contains the [`Error`] type which represents all possible errors
//! that can occur when reading or writing a tree through a typed view.
//!
//! # Example
//!
//! ```
//! use tagbind::{Error, Result, View};
//!
//! fn name_or_none(root: &View) -> Result<Option<String>> {
//!     match root.get::<String>("getName") {
//!         Ok(name) => Ok(name),
//!         Err(Error::StaleHandle { .. }) => {
//!             println!("document was rebuilt, fetch a fresh root");
//!             Ok(None)
//!         }
//!         Err(e) => Err(e),
//!     }
//! }
//! ```

use crate::tree::TreeError;

/// Alias for a `Result` with the error type [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// This type represents all possible errors that can occur when working with
/// typed views.
///
/// # Variants
///
/// - [`ConverterNotFound`](Error::ConverterNotFound) - no converter rule matched a value type
/// - [`UnsupportedViewMethod`](Error::UnsupportedViewMethod) - a declared method matched no dispatch rule
/// - [`StaleHandle`](Error::StaleHandle) - the tree node behind a handler is gone
/// - [`CalledOnInvalidStableHandle`](Error::CalledOnInvalidStableHandle) - a stable handle could not recover
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The converter registry could not resolve a converter for the type.
    #[error("no converter found for `{type_name}`")]
    ConverterNotFound { type_name: String },

    /// A view interface declares a method that no dispatch rule accepts.
    ///
    /// Raised when the interface is registered, before any tree access.
    #[error("unsupported view method `{interface}::{method}`: {reason}")]
    UnsupportedViewMethod {
        interface: String,
        method: String,
        reason: String,
    },

    /// The tree node backing a handler was destroyed or the document was rebuilt.
    #[error("stale handle: {detail}")]
    StaleHandle { detail: String },

    /// A stable handle exhausted its recovery path.
    #[error("called on invalid stable handle: {detail}")]
    CalledOnInvalidStableHandle { detail: String },

    /// A converter rejected the text it was given.
    #[error("cannot convert {text:?} to `{target}`: {reason}")]
    Conversion {
        text: String,
        target: String,
        reason: String,
    },

    /// The interface does not declare the called method.
    #[error("interface `{interface}` has no method `{method}`")]
    UnknownMethod { interface: String, method: String },

    /// A view interface referenced by name was never registered.
    #[error("unknown view interface `{0}`")]
    UnknownInterface(String),

    /// Two different descriptors were registered under the same interface name.
    #[error("view interface `{0}` is already registered with a different descriptor")]
    DuplicateInterface(String),

    /// A value or view had a different type than the caller asked for.
    #[error("type mismatch: expected `{expected}`, found `{found}`")]
    TypeMismatch { expected: String, found: String },

    /// A view method was called with the wrong arguments.
    #[error("`{method}` expects {expected} argument(s), got {found}")]
    InvalidArguments {
        method: String,
        expected: usize,
        found: usize,
    },

    /// The document has no root element to bind.
    #[error("document `{0}` has no root element")]
    MissingRoot(String),

    /// A write was attempted outside the exclusive mutation scope.
    #[error("write attempted outside the exclusive mutation scope")]
    WriteOutsideExclusiveScope,

    /// A cancellable conversion observed its cancellation token.
    #[error("operation canceled")]
    Canceled,

    /// The tree provider reported a failure.
    #[error(transparent)]
    Tree(#[from] TreeError),
}

impl Error {
    /// Stable identifier for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConverterNotFound { .. } => "CONVERTER_NOT_FOUND",
            Self::UnsupportedViewMethod { .. } => "UNSUPPORTED_VIEW_METHOD",
            Self::StaleHandle { .. } => "STALE_HANDLE",
            Self::CalledOnInvalidStableHandle { .. } => "CALLED_ON_INVALID_STABLE_HANDLE",
            Self::Conversion { .. } => "CONVERSION",
            Self::UnknownMethod { .. } => "UNKNOWN_METHOD",
            Self::UnknownInterface(_) => "UNKNOWN_INTERFACE",
            Self::DuplicateInterface(_) => "DUPLICATE_INTERFACE",
            Self::TypeMismatch { .. } => "TYPE_MISMATCH",
            Self::InvalidArguments { .. } => "INVALID_ARGUMENTS",
            Self::MissingRoot(_) => "MISSING_ROOT",
            Self::WriteOutsideExclusiveScope => "WRITE_OUTSIDE_EXCLUSIVE_SCOPE",
            Self::Canceled => "CANCELED",
            Self::Tree(_) => "TREE",
        }
    }

    /// Returns `true` for errors caused by misuse of the API rather than by
    /// the state of the document.
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedViewMethod { .. }
                | Self::CalledOnInvalidStableHandle { .. }
                | Self::UnknownMethod { .. }
                | Self::InvalidArguments { .. }
                | Self::TypeMismatch { .. }
                | Self::DuplicateInterface(_)
        )
    }

    pub(crate) fn stale(detail: impl Into<String>) -> Self {
        Self::StaleHandle {
            detail: detail.into(),
        }
    }

    pub(crate) fn conversion(
        text: impl Into<String>,
        target: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        Self::Conversion {
            text: text.into(),
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn unsupported(
        interface: impl Into<String>,
        method: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::UnsupportedViewMethod {
            interface: interface.into(),
            method: method.into(),
            reason: reason.into(),
        }
    }
}
