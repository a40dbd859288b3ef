use std::{
    any::TypeId,
    collections::HashMap,
    sync::{Arc, RwLock},
};

use tracing::trace;

use crate::{
    BoolConverter, Converter, ConverterClass, Error, FromStrConverter, InterfaceRef,
    ReferenceConverter, Result, TextConverter, Typed, TypeKey, TypedConverter, ValueType,
    ViewInterface,
    util::{read, write},
};

/// Maps value types to converters.
///
/// Resolution precedence for a call site:
///
/// 1. an explicit converter class attached to the call site,
/// 2. an exact-type registration,
/// 3. the enumeration auto-converter,
/// 4. the reference auto-converter for values naming another view,
/// 5. passthrough for raw text.
///
/// Memoization tables only grow; they are bounded by the number of distinct
/// types and converter classes, not by document size.
pub struct ConverterRegistry {
    exact: RwLock<HashMap<TypeId, Arc<dyn Converter>>>,
    instances: RwLock<HashMap<TypeId, Arc<dyn Converter>>>,
    enums: RwLock<HashMap<TypeId, Arc<dyn Converter>>>,
    references: RwLock<HashMap<String, Arc<dyn Converter>>>,
    passthrough: Arc<dyn Converter>,
}

macro_rules! register_from_str {
    ($registry:ident, $($ty:ty),+ $(,)?) => {
        $($registry.register(FromStrConverter::<$ty>::new());)+
    };
}

impl ConverterRegistry {
    /// An empty registry. Only passthrough text resolves.
    pub fn new() -> Self {
        Self {
            exact: RwLock::new(HashMap::new()),
            instances: RwLock::new(HashMap::new()),
            enums: RwLock::new(HashMap::new()),
            references: RwLock::new(HashMap::new()),
            passthrough: Arc::new(Typed(TextConverter)),
        }
    }

    /// A registry with converters for strings, booleans, characters and
    /// the primitive numeric types.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register_dyn(TypeKey::of::<String>(), registry.passthrough.clone());
        registry.register(BoolConverter);
        register_from_str!(
            registry, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64,
            char,
        );
        registry
    }

    /// Registers `converter` for its target type, replacing any previous one.
    pub fn register<C: TypedConverter>(&self, converter: C) {
        self.register_dyn(TypeKey::of::<C::Target>(), Arc::new(Typed(converter)));
    }

    pub fn register_dyn(&self, key: TypeKey, converter: Arc<dyn Converter>) {
        trace!(target_type = key.name(), "registering converter");
        write(&self.exact).insert(key.id(), converter);
    }

    pub fn contains(&self, key: &TypeKey) -> bool {
        read(&self.exact).contains_key(&key.id())
    }

    /// The passthrough converter for raw text.
    pub fn passthrough(&self) -> Arc<dyn Converter> {
        self.passthrough.clone()
    }

    /// Resolves the converter for a value type without a call-site override.
    pub fn resolve(&self, ty: &ValueType) -> Result<Arc<dyn Converter>> {
        self.resolve_with(None, ty)
    }

    /// Resolves the converter for a call site.
    pub fn resolve_with(
        &self,
        explicit: Option<&ConverterClass>,
        ty: &ValueType,
    ) -> Result<Arc<dyn Converter>> {
        if let Some(class) = explicit {
            return Ok(self.resolve_class(class));
        }
        match ty {
            ValueType::Scalar(key) => {
                if let Some(converter) = read(&self.exact).get(&key.id()) {
                    return Ok(converter.clone());
                }
                if key.is::<String>() {
                    return Ok(self.passthrough());
                }
                Err(Error::ConverterNotFound {
                    type_name: key.name().to_owned(),
                })
            }
            ValueType::Enum { key, converter } => {
                if let Some(registered) = read(&self.exact).get(&key.id()) {
                    return Ok(registered.clone());
                }
                if let Some(memo) = read(&self.enums).get(&key.id()) {
                    return Ok(memo.clone());
                }
                Ok(write(&self.enums)
                    .entry(key.id())
                    .or_insert_with(*converter)
                    .clone())
            }
            ValueType::Reference(InterfaceRef::Static(describe)) => {
                Ok(self.resolve_reference(&describe()))
            }
            ValueType::Reference(InterfaceRef::Named(name)) => {
                Err(Error::UnknownInterface(name.clone()))
            }
            ValueType::Void | ValueType::View(_) | ValueType::ViewList(_) => {
                Err(Error::ConverterNotFound {
                    type_name: ty.type_name(),
                })
            }
        }
    }

    /// The reference auto-converter for `interface`, memoized by interface name.
    pub fn resolve_reference(&self, interface: &Arc<ViewInterface>) -> Arc<dyn Converter> {
        if let Some(memo) = read(&self.references).get(interface.name()) {
            return memo.clone();
        }
        write(&self.references)
            .entry(interface.name().to_owned())
            .or_insert_with(|| Arc::new(ReferenceConverter::new(interface.clone())))
            .clone()
    }

    /// Memoized singleton of an explicitly named converter implementation.
    pub fn resolve_instance<C: Converter + Default>(&self) -> Arc<dyn Converter> {
        self.resolve_class(&ConverterClass::of::<C>())
    }

    pub fn resolve_class(&self, class: &ConverterClass) -> Arc<dyn Converter> {
        if let Some(instance) = read(&self.instances).get(&class.id()) {
            return instance.clone();
        }
        write(&self.instances)
            .entry(class.id())
            .or_insert_with(|| class.instantiate())
            .clone()
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
