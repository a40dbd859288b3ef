//! Typed views over mutable tag trees.
//!
//! `tagbind` binds an externally owned, mutable tree of tags (an XML-like
//! document) to typed views. A view method call is dispatched to a strategy
//! selected once per interface method, which reads or writes a tag, an
//! attribute or a child through converters from a [`ConverterRegistry`].
//! Converted values are cached per handler until the tree's modification
//! stamp advances, and [`StableHandle`]s keep referring to the same logical
//! node across full rebuilds of the tree.
//!
//! ```
//! use std::sync::Arc;
//! use tagbind::{Annotation, BindingEngine, MemoryTree, MethodDecl, ValueType, View, ViewInterface};
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
//!
//! let tree = Arc::new(
//!     MemoryTree::parse("ui", r#"<widget name="A" count="3"><widget name="B"/></widget>"#).unwrap(),
//! );
//! let binding = BindingEngine::new().bind(tree);
//! let root = binding.root_view(&widget).unwrap();
//! assert_eq!(root.get::<String>("getName").unwrap().as_deref(), Some("A"));
//! assert_eq!(root.get::<i32>("getCount").unwrap(), Some(3));
//! let children: Vec<View> = root.children("getChildren").unwrap();
//! assert_eq!(children[0].get::<String>("getName").unwrap().as_deref(), Some("B"));
//! ```

mod binding;
mod cache;
mod config;
mod convert;
mod dispatch;
mod error;
mod generation;
mod handler;
mod inject;
mod interface;
mod invocation;
mod memory;
mod stable;
mod tree;
mod util;
mod view;

pub use binding::{BindingEngine, DocumentBinding, DocumentBindingBuilder};
pub use config::{BindingConfig, NameStrategy};
pub use convert::*;
pub use dispatch::DispatchTable;
pub use error::{Error, Result};
pub use generation::HandlerId;
pub use inject::{PlaceholderInjector, Reference, TextInjector};
pub use interface::{
    Annotation, InterfaceRef, MethodDecl, TypeKey, ValueType, ViewInterface, ViewInterfaceBuilder,
};
pub use invocation::{Invocation, ValueTarget};
pub use memory::MemoryTree;
pub use stable::{PathSegment, PathStep, Revalidation, StableHandle, StablePath, StableState};
pub use tree::{MutationScope, NodeKey, Stamp, TreeError, TreeNode, TreeProvider, exclusive};
pub use view::{FromView, Outcome, TypedView, View};
