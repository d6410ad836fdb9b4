//! Process-wide contract cache and type/method registry.
//!
//! The registry is shared by every serializer. Contracts are built at most
//! once per type in the steady state: the build happens outside the lock
//! and the first finished contract wins, so concurrent callers racing on the
//! same type all observe the same `Arc`.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;

use crate::contract::Contract;
use crate::late_bound::Invocable;
use crate::reflect::{Reflect, TypeDescriptor};
use crate::value::Value;

static GLOBAL: LazyLock<ContractRegistry> = LazyLock::new(ContractRegistry::new);

pub struct ContractRegistry {
    contracts: RwLock<HashMap<TypeId, Arc<Contract>>>,
    types: RwLock<HashMap<&'static str, &'static TypeDescriptor>>,
    methods: RwLock<HashMap<(String, String), Invocable>>,
}

impl Default for ContractRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ContractRegistry {
    pub fn new() -> Self {
        Self {
            contracts: RwLock::new(HashMap::new()),
            types: RwLock::new(HashMap::new()),
            methods: RwLock::new(HashMap::new()),
        }
    }

    /// The shared process-wide registry.
    pub fn global() -> &'static ContractRegistry {
        &GLOBAL
    }

    /// Make `T` (and its base chain) resolvable by name.
    pub fn register<T: Reflect>(&self) {
        self.register_descriptor(T::type_descriptor());
    }

    pub fn register_descriptor(&self, descriptor: &'static TypeDescriptor) {
        let mut types = self.types.write();
        let mut current = Some(descriptor);
        while let Some(descriptor) = current {
            match types.get(descriptor.name()) {
                Some(existing) if !existing.same_type(descriptor) => {
                    log::warn!(
                        "type name '{}' is already registered for another type; keeping the first",
                        descriptor.name()
                    );
                }
                Some(_) => {}
                None => {
                    log::trace!("registered type '{}'", descriptor.name());
                    types.insert(descriptor.name(), descriptor);
                }
            }
            current = descriptor.base_descriptor();
        }
    }

    /// Resolve a type name written on the wire.
    pub fn resolve_type(&self, name: &str) -> Option<&'static TypeDescriptor> {
        self.types.read().get(name).copied()
    }

    /// The cached contract for `descriptor`, building it on first use.
    pub fn get_or_build(&self, descriptor: &'static TypeDescriptor) -> Arc<Contract> {
        let cached = self.contracts.read().get(&descriptor.type_id()).cloned();
        if let Some(contract) = cached {
            return contract;
        }

        self.register_descriptor(descriptor);
        let built = Arc::new(Contract::build(descriptor));
        log::debug!(
            "built contract for '{}' ({} members)",
            descriptor.name(),
            built.len()
        );
        self.contracts
            .write()
            .entry(descriptor.type_id())
            .or_insert(built)
            .clone()
    }

    pub fn contract_of<T: Reflect>(&self) -> Arc<Contract> {
        self.get_or_build(T::type_descriptor())
    }

    /// Number of contracts built so far.
    pub fn contract_count(&self) -> usize {
        self.contracts.read().len()
    }

    /// Register a method callable through late-bound references.
    pub fn register_method(
        &self,
        type_name: &str,
        method_name: &str,
        method: impl Fn(&[Value]) -> Value + Send + Sync + 'static,
    ) {
        let previous = self.methods.write().insert(
            (type_name.to_owned(), method_name.to_owned()),
            Arc::new(method),
        );
        if previous.is_some() {
            log::debug!("replaced method '{type_name}::{method_name}'");
        }
    }

    /// Register a method on reflected type `T`, making `T` resolvable too.
    pub fn register_method_for<T: Reflect>(
        &self,
        method_name: &str,
        method: impl Fn(&[Value]) -> Value + Send + Sync + 'static,
    ) {
        let descriptor = T::type_descriptor();
        self.register_descriptor(descriptor);
        self.register_method(descriptor.name(), method_name, method);
    }

    pub fn resolve_method(&self, type_name: &str, method_name: &str) -> Option<Invocable> {
        self.methods
            .read()
            .get(&(type_name.to_owned(), method_name.to_owned()))
            .cloned()
    }
}
