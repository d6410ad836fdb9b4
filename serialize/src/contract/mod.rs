//! Serializable shape of a reflected type.
//!
//! A [`Contract`] is computed once per type from its [`TypeDescriptor`]:
//!
//! - a type is serializable if it carries [`Marker::Serializable`] or
//!   derives from an element type; otherwise its contract is empty;
//! - base members come first, walking the base chain from the root;
//! - a member is included if it is public or marked include, unless it is
//!   marked exclude (exclude wins);
//! - accessor members need both a getter and a setter;
//! - a derived member with the same wire name replaces the base member in
//!   place.
//!
//! Contracts are cached by [`ContractRegistry`](crate::ContractRegistry).
//!
//! [`Marker::Serializable`]: crate::Marker::Serializable

mod member;

use std::collections::HashMap;
use std::fmt;

pub use member::{Access, Category, Member};

use crate::error::ResolutionFailure;
use crate::late_bound::LoadContext;
use crate::reflect::{
    AfterLoadFn, BaseLink, BeforeSerializeFn, MemberDescriptor, MemberShape, Reflect,
    TypeDescriptor, Visibility, find_marker, markers,
};

/// Hooks declared by one type on the chain, with the projection to reach it.
struct Hooks {
    owner: &'static TypeDescriptor,
    via: Vec<BaseLink>,
    before_serialize: Option<BeforeSerializeFn>,
    after_load: Option<AfterLoadFn>,
}

pub struct Contract {
    descriptor: &'static TypeDescriptor,
    serializable: bool,
    members: Vec<Member>,
    by_wire_name: HashMap<String, usize>,
    hooks: Vec<Hooks>,
}

impl Contract {
    pub(crate) fn build(descriptor: &'static TypeDescriptor) -> Self {
        let serializable = descriptor.extends_element()
            || find_marker::<markers::Serializable>(descriptor.markers()).is_some();
        let mut contract = Self {
            descriptor,
            serializable,
            members: Vec::new(),
            by_wire_name: HashMap::new(),
            hooks: Vec::new(),
        };
        if serializable {
            contract.declare(descriptor, Vec::new());
        } else {
            log::debug!("type '{}' is not serializable", descriptor.name());
        }
        contract
    }

    fn declare(&mut self, descriptor: &'static TypeDescriptor, via: Vec<BaseLink>) {
        if let Some(link) = descriptor.base() {
            let mut base_via = via.clone();
            base_via.push(*link);
            self.declare((link.descriptor)(), base_via);
        }

        let before_serialize = descriptor.before_serialize_hook();
        let after_load = descriptor.after_load_hook();
        if before_serialize.is_some() || after_load.is_some() {
            self.hooks.push(Hooks {
                owner: descriptor,
                via: via.clone(),
                before_serialize,
                after_load,
            });
        }

        for declared in descriptor.members() {
            if !is_included(declared) {
                continue;
            }
            let Some(member) = Member::declared(descriptor, declared, via.clone()) else {
                continue;
            };
            match self.by_wire_name.get(member.wire_name()) {
                Some(&index) => {
                    log::trace!(
                        "'{}.{}' replaces inherited member '{}.{}'",
                        descriptor.name(),
                        member.name(),
                        self.members[index].owner(),
                        self.members[index].name()
                    );
                    self.members[index] = member;
                }
                None => {
                    self.by_wire_name
                        .insert(member.wire_name().to_owned(), self.members.len());
                    self.members.push(member);
                }
            }
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.descriptor.name()
    }

    pub fn descriptor(&self) -> &'static TypeDescriptor {
        self.descriptor
    }

    /// An empty contract may still be serializable; this tells them apart.
    pub fn is_serializable(&self) -> bool {
        self.serializable
    }

    /// Members in serialization order.
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// Look a member up by its wire name.
    pub fn member(&self, wire_name: &str) -> Option<&Member> {
        self.by_wire_name
            .get(wire_name)
            .map(|&index| &self.members[index])
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Run before-serialize hooks, base types first.
    pub fn before_serialize(&self, instance: &mut dyn Reflect) {
        for hooks in &self.hooks {
            let Some(hook) = hooks.before_serialize else {
                continue;
            };
            if let Some(target) = project_mut(&hooks.via, instance) {
                hook(target);
            }
        }
    }

    /// Run after-load hooks, base types first, collecting failures.
    pub fn after_load(
        &self,
        instance: &mut dyn Reflect,
        ctx: &LoadContext<'_>,
    ) -> Vec<ResolutionFailure> {
        let mut failures = Vec::new();
        for hooks in &self.hooks {
            let Some(hook) = hooks.after_load else {
                continue;
            };
            let Some(target) = project_mut(&hooks.via, instance) else {
                log::warn!(
                    "could not reach base '{}' of '{}'",
                    hooks.owner.name(),
                    self.type_name()
                );
                continue;
            };
            if let Err(failure) = hook(target, ctx) {
                failures.push(failure);
            }
        }
        failures
    }
}

impl fmt::Debug for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Contract")
            .field("type", &self.type_name())
            .field("serializable", &self.serializable)
            .field("members", &self.members)
            .finish()
    }
}

fn is_included(declared: &MemberDescriptor) -> bool {
    if find_marker::<markers::Exclude>(declared.markers()).is_some() {
        return false;
    }
    let visible = declared.visibility() == Visibility::Public
        || find_marker::<markers::Include>(declared.markers()).is_some();
    if !visible {
        return false;
    }
    match declared.shape() {
        MemberShape::Slot(_) => true,
        MemberShape::Accessor(pair) => pair.get.is_some() && pair.set.is_some(),
        MemberShape::Opaque => false,
    }
}

fn project_mut<'a>(via: &[BaseLink], instance: &'a mut dyn Reflect) -> Option<&'a mut dyn Reflect> {
    let mut current = instance;
    for link in via {
        current = (link.project_mut)(current)?;
    }
    Some(current)
}
