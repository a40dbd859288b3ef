//! Per-interface invocation tables.
//!
//! Registering an interface selects an [`Invocation`] for each of its methods
//! and registers every interface those methods reach. A method that no rule
//! accepts fails the registration with [`Error::UnsupportedViewMethod`], so a
//! broken interface never gets to touch a tree.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use tracing::{debug, trace};

use crate::{
    Converter, ConverterRegistry, Error, InterfaceRef, MethodDecl, NameStrategy, Outcome, Result,
    Value, ValueType, ViewInterface,
    handler::{NodeHandler, Session},
    invocation::{Invocation, ValueTarget},
    util::{read, singular, split_words, write},
};

struct Entry {
    interface: Arc<ViewInterface>,
    methods: HashMap<String, Arc<Invocation>>,
}

/// Registration in progress: interfaces being built and finished entries.
struct Pending<'r> {
    registry: &'r ConverterRegistry,
    default_strategy: NameStrategy,
    building: Vec<Arc<ViewInterface>>,
    done: Vec<Entry>,
}

impl Pending<'_> {
    fn find(&self, name: &str) -> Option<&Arc<ViewInterface>> {
        self.building
            .iter()
            .chain(self.done.iter().map(|entry| &entry.interface))
            .find(|interface| interface.name() == name)
    }
}

/// Invocation strategies keyed by interface name, then method name.
#[derive(Default)]
pub struct DispatchTable {
    interfaces: RwLock<HashMap<String, Entry>>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_registered(&self, interface: &str) -> bool {
        read(&self.interfaces).contains_key(interface)
    }

    /// The registered descriptor named `name`.
    pub fn interface(&self, name: &str) -> Option<Arc<ViewInterface>> {
        read(&self.interfaces)
            .get(name)
            .map(|entry| entry.interface.clone())
    }

    /// Builds the invocation table of `interface` and of every interface it
    /// reaches. Registering the same descriptor twice is a no-op.
    pub fn register(
        &self,
        interface: &Arc<ViewInterface>,
        registry: &ConverterRegistry,
        default_strategy: NameStrategy,
    ) -> Result<()> {
        if let Some(existing) = self.interface(interface.name()) {
            return same_descriptor(&existing, interface);
        }
        let mut pending = Pending {
            registry,
            default_strategy,
            building: Vec::new(),
            done: Vec::new(),
        };
        self.build(interface, &mut pending)?;

        let mut interfaces = write(&self.interfaces);
        for entry in pending.done {
            if let Some(existing) = interfaces.get(entry.interface.name()) {
                same_descriptor(&existing.interface, &entry.interface)?;
                continue;
            }
            debug!(
                interface = entry.interface.name(),
                methods = entry.methods.len(),
                "registered view interface"
            );
            interfaces.insert(entry.interface.name().to_owned(), entry);
        }
        Ok(())
    }

    /// The invocation selected for `interface::method`.
    pub fn resolve(&self, interface: &str, method: &str) -> Result<Arc<Invocation>> {
        let interfaces = read(&self.interfaces);
        let entry = interfaces
            .get(interface)
            .ok_or_else(|| Error::UnknownInterface(interface.to_owned()))?;
        entry
            .methods
            .get(method)
            .cloned()
            .ok_or_else(|| Error::UnknownMethod {
                interface: interface.to_owned(),
                method: method.to_owned(),
            })
    }

    pub(crate) fn dispatch(
        &self,
        session: Session<'_>,
        handler: &Arc<NodeHandler>,
        method: &str,
        args: &[Value],
    ) -> Result<Outcome> {
        let Some(interface) = handler.interface() else {
            return Err(Error::UnknownMethod {
                interface: "<value>".to_owned(),
                method: method.to_owned(),
            });
        };
        let invocation = self.resolve(interface.name(), method)?;
        trace!(
            interface = interface.name(),
            method,
            handler = ?handler.id(),
            invocation = ?invocation,
            "dispatch"
        );
        invocation.invoke(session, handler, method, args)
    }

    fn build(&self, interface: &Arc<ViewInterface>, pending: &mut Pending<'_>) -> Result<()> {
        pending.building.push(interface.clone());
        let strategy = interface
            .name_strategy()
            .unwrap_or(pending.default_strategy);
        let mut methods = HashMap::with_capacity(interface.methods().len());
        for method in interface.methods() {
            let invocation = self.select(interface, method, strategy, pending)?;
            methods.insert(method.name().to_owned(), Arc::new(invocation));
        }
        pending
            .building
            .retain(|building| !Arc::ptr_eq(building, interface));
        pending.done.push(Entry {
            interface: interface.clone(),
            methods,
        });
        Ok(())
    }

    fn resolve_ref(
        &self,
        reference: &InterfaceRef,
        pending: &mut Pending<'_>,
    ) -> Result<Arc<ViewInterface>> {
        let target = match reference {
            InterfaceRef::Static(describe) => describe(),
            InterfaceRef::Named(name) => match self.interface(name) {
                Some(registered) => return Ok(registered),
                None => pending
                    .find(name)
                    .cloned()
                    .ok_or_else(|| Error::UnknownInterface(name.clone()))?,
            },
        };
        if let Some(registered) = self.interface(target.name()) {
            same_descriptor(&registered, &target)?;
            return Ok(registered);
        }
        if let Some(known) = pending.find(target.name()) {
            same_descriptor(known, &target)?;
            return Ok(target);
        }
        self.build(&target, pending)?;
        Ok(target)
    }

    fn converter_for(
        &self,
        ty: &ValueType,
        method: &MethodDecl,
        pending: &mut Pending<'_>,
    ) -> Result<Arc<dyn Converter>> {
        if let Some(class) = method.converter_override() {
            return Ok(pending.registry.resolve_class(class));
        }
        if let ValueType::Reference(reference) = ty {
            let target = self.resolve_ref(reference, pending)?;
            return Ok(pending.registry.resolve_reference(&target));
        }
        match pending.registry.resolve(ty) {
            Err(Error::ConverterNotFound { .. }) if method.is_lenient() => {
                Ok(pending.registry.passthrough())
            }
            resolved => resolved,
        }
    }

    fn select(
        &self,
        interface: &ViewInterface,
        method: &MethodDecl,
        strategy: NameStrategy,
        pending: &mut Pending<'_>,
    ) -> Result<Invocation> {
        let unsupported = |reason: &str| Error::unsupported(interface.name(), method.name(), reason);
        let returns = method.returns();
        let no_params = method.params().is_empty();

        if let (Some((name, index)), ValueType::View(reference)) = (method.sub_tag(), returns) {
            if !no_params {
                return Err(unsupported("a child accessor takes no parameters"));
            }
            return Ok(Invocation::GetFixedChild {
                name: name.to_owned(),
                index,
                interface: self.resolve_ref(reference, pending)?,
            });
        }

        if let Some(name) = method.sub_tag_list() {
            if !no_params {
                return Err(unsupported("a collection accessor takes no parameters"));
            }
            return match returns {
                ValueType::ViewList(reference) => Ok(Invocation::GetCollection {
                    name: name.to_owned(),
                    interface: self.resolve_ref(reference, pending)?,
                }),
                ValueType::View(reference) => Ok(Invocation::AddCollectionChild {
                    name: name.to_owned(),
                    interface: self.resolve_ref(reference, pending)?,
                }),
                _ => Err(unsupported(
                    "a sub-tag list must return a view list or add a view",
                )),
            };
        }

        let explicit = if let Some(name) = method.attribute() {
            Some(ValueTarget::Attribute(name.to_owned()))
        } else if method.has_tag_value() {
            Some(ValueTarget::TagValue)
        } else {
            method.sub_tag().map(|(name, index)| ValueTarget::SubTag {
                name: name.to_owned(),
                index,
            })
        };
        if let Some(target) = explicit {
            return self.value_invocation(target, method, pending, &unsupported);
        }

        let words = split_words(method.name());
        let Some((prefix, property)) = words.split_first() else {
            return Err(unsupported("empty method name"));
        };
        if property.is_empty() {
            return Err(unsupported("no binding annotation and no property name"));
        }
        match (prefix.as_str(), returns) {
            ("get" | "is", ValueType::View(reference)) if no_params => {
                Ok(Invocation::GetFixedChild {
                    name: strategy.join(property),
                    index: 0,
                    interface: self.resolve_ref(reference, pending)?,
                })
            }
            ("get", ValueType::ViewList(reference)) if no_params => {
                let mut words = property.to_vec();
                if let Some(last) = words.last_mut() {
                    *last = singular(last);
                }
                Ok(Invocation::GetCollection {
                    name: strategy.join(&words),
                    interface: self.resolve_ref(reference, pending)?,
                })
            }
            ("add", ValueType::View(reference)) if no_params => {
                Ok(Invocation::AddCollectionChild {
                    name: strategy.join(property),
                    interface: self.resolve_ref(reference, pending)?,
                })
            }
            ("get" | "is" | "set", _) => {
                let target = if property.len() == 1 && property[0] == "value" {
                    ValueTarget::TagValue
                } else {
                    ValueTarget::Attribute(strategy.join(property))
                };
                self.value_invocation(target, method, pending, &unsupported)
            }
            _ => Err(unsupported(
                "no binding annotation and no get/is/set/add accessor shape",
            )),
        }
    }

    fn value_invocation(
        &self,
        target: ValueTarget,
        method: &MethodDecl,
        pending: &mut Pending<'_>,
        unsupported: &dyn Fn(&str) -> Error,
    ) -> Result<Invocation> {
        let params = method.params();
        let returns = method.returns();
        if matches!(returns, ValueType::Void) {
            let [param] = params else {
                return Err(unsupported("a setter takes exactly one parameter"));
            };
            if !param.is_value() {
                return Err(unsupported("a setter parameter must be a value"));
            }
            if method.is_indicator() {
                if !param.is_bool() {
                    return Err(unsupported("an indicator setter takes a bool"));
                }
                return Ok(Invocation::SetIndicator { target });
            }
            let converter = self.converter_for(param, method, pending)?;
            return Ok(Invocation::SetValue { target, converter });
        }
        if !params.is_empty() {
            return Err(unsupported("a getter takes no parameters"));
        }
        if !returns.is_value() {
            return Err(unsupported("a value getter must return a value"));
        }
        if method.is_indicator() {
            if !returns.is_bool() {
                return Err(unsupported("an indicator getter returns bool"));
            }
            return Ok(Invocation::GetIndicator { target });
        }
        let converter = self.converter_for(returns, method, pending)?;
        Ok(Invocation::GetValue { target, converter })
    }
}

fn same_descriptor(existing: &Arc<ViewInterface>, candidate: &Arc<ViewInterface>) -> Result<()> {
    if Arc::ptr_eq(existing, candidate) {
        Ok(())
    } else {
        Err(Error::DuplicateInterface(candidate.name().to_owned()))
    }
}
