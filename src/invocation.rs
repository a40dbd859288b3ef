use std::{fmt, sync::Arc};

use crate::{
    Converter, Error, Outcome, Result, Value, ViewInterface,
    handler::{NodeHandler, Session},
};

/// Tree position a value invocation reads or writes, relative to the view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValueTarget {
    /// Text of the view's own tag.
    TagValue,
    /// An attribute of the view's tag.
    Attribute(String),
    /// Text of a statically named child tag.
    SubTag { name: String, index: usize },
}

impl ValueTarget {
    fn handler(&self, session: Session<'_>, view: &Arc<NodeHandler>) -> Result<Arc<NodeHandler>> {
        match self {
            Self::TagValue => Ok(view.clone()),
            Self::Attribute(name) => session.handler(view.attribute_handler(session, name)),
            Self::SubTag { name, index } => {
                session.handler(view.fixed_child(session, name, *index, None)?)
            }
        }
    }
}

/// Strategy satisfying one view method.
///
/// Built once per interface method when the interface is registered and
/// shared by every view of that interface.
#[derive(Clone)]
pub enum Invocation {
    GetValue {
        target: ValueTarget,
        converter: Arc<dyn Converter>,
    },
    SetValue {
        target: ValueTarget,
        converter: Arc<dyn Converter>,
    },
    GetIndicator {
        target: ValueTarget,
    },
    SetIndicator {
        target: ValueTarget,
    },
    GetFixedChild {
        name: String,
        index: usize,
        interface: Arc<ViewInterface>,
    },
    GetCollection {
        name: String,
        interface: Arc<ViewInterface>,
    },
    AddCollectionChild {
        name: String,
        interface: Arc<ViewInterface>,
    },
}

impl Invocation {
    pub(crate) fn invoke(
        &self,
        session: Session<'_>,
        view: &Arc<NodeHandler>,
        method: &str,
        args: &[Value],
    ) -> Result<Outcome> {
        match self {
            Self::GetValue { target, converter } => {
                expect_args(method, args, 0)?;
                let handler = target.handler(session, view)?;
                Ok(Outcome::Value(handler.read_value(session, converter)?))
            }
            Self::SetValue { target, converter } => {
                if args.len() > 1 {
                    return Err(Error::InvalidArguments {
                        method: method.to_owned(),
                        expected: 1,
                        found: args.len(),
                    });
                }
                let handler = target.handler(session, view)?;
                handler.write_value(session, converter, args.first())?;
                Ok(Outcome::Unit)
            }
            Self::GetIndicator { target } => {
                expect_args(method, args, 0)?;
                let handler = target.handler(session, view)?;
                Ok(Outcome::Flag(handler.read_indicator(session)?.is_some()))
            }
            Self::SetIndicator { target } => {
                expect_args(method, args, 1)?;
                let present = args[0]
                    .downcast_ref::<bool>()
                    .copied()
                    .ok_or_else(|| Error::TypeMismatch {
                        expected: "bool".to_owned(),
                        found: "another value type".to_owned(),
                    })?;
                let handler = target.handler(session, view)?;
                handler.write_indicator(session, present)?;
                Ok(Outcome::Unit)
            }
            Self::GetFixedChild {
                name,
                index,
                interface,
            } => {
                expect_args(method, args, 0)?;
                let id = view.fixed_child(session, name, *index, Some(interface.clone()))?;
                Ok(Outcome::View(session.view(id)))
            }
            Self::GetCollection { name, interface } => {
                expect_args(method, args, 0)?;
                let ids = view.collection_children(session, name, Some(interface))?;
                Ok(Outcome::Views(
                    ids.into_iter().map(|id| session.view(id)).collect(),
                ))
            }
            Self::AddCollectionChild { name, interface } => {
                expect_args(method, args, 0)?;
                let id = view.add_child(session, name, Some(interface))?;
                Ok(Outcome::View(session.view(id)))
            }
        }
    }
}

fn expect_args(method: &str, args: &[Value], expected: usize) -> Result<()> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(Error::InvalidArguments {
            method: method.to_owned(),
            expected,
            found: args.len(),
        })
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GetValue { target, converter } => f
                .debug_struct("GetValue")
                .field("target", target)
                .field("converter", &converter.target())
                .finish(),
            Self::SetValue { target, converter } => f
                .debug_struct("SetValue")
                .field("target", target)
                .field("converter", &converter.target())
                .finish(),
            Self::GetIndicator { target } => {
                f.debug_struct("GetIndicator").field("target", target).finish()
            }
            Self::SetIndicator { target } => {
                f.debug_struct("SetIndicator").field("target", target).finish()
            }
            Self::GetFixedChild {
                name,
                index,
                interface,
            } => f
                .debug_struct("GetFixedChild")
                .field("name", name)
                .field("index", index)
                .field("interface", &interface.name())
                .finish(),
            Self::GetCollection { name, interface } => f
                .debug_struct("GetCollection")
                .field("name", name)
                .field("interface", &interface.name())
                .finish(),
            Self::AddCollectionChild { name, interface } => f
                .debug_struct("AddCollectionChild")
                .field("name", name)
                .field("interface", &interface.name())
                .finish(),
        }
    }
}
