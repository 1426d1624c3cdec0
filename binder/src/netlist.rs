// netlist.rs — Minimal structural representation
//
// The slice of the generated circuit hierarchy that binding needs to see:
// module instances with their component types, the shared resources
// (memories, callee modules) they canonically own, placeholder proxy ports
// on duplicated instances, and the port edges connecting call sites to
// either a proxy or a real port. Proxy resolution (proxy.rs) rewrites this
// structure in place; the resource report (persist.rs) walks it.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::id::{ModuleId, ResourceId};

// ── Shared resources ────────────────────────────────────────────────────────

/// What kind of shared hardware a resource stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    /// A memory channel/port shared across modules.
    Memory,
    /// A shared sub-function module reached from several call sites.
    Function,
}

/// A physical resource that several instantiated modules may reference;
/// exactly one structural instance owns the real thing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedResource {
    pub id: ResourceId,
    pub name: String,
    pub kind: ResourceKind,
}

// ── Instances, proxies, edges ───────────────────────────────────────────────

/// A placeholder port standing in for a shared resource on an instance
/// that does not own it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proxy {
    pub resource: ResourceId,
    pub port_name: String,
}

/// Where a port edge lands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EdgeTarget {
    /// Through a placeholder proxy held by `module`.
    Proxy { module: ModuleId, resource: ResourceId },
    /// Directly at a named port of `module`.
    Port { module: ModuleId, port: String },
}

/// One call/port connection from an instance to a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortEdge {
    pub from_port: String,
    pub target: EdgeTarget,
}

/// One instantiated module in the hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleInstance {
    pub id: ModuleId,
    /// Instance path name, e.g. `top.f_0`.
    pub name: String,
    /// Component type instantiated here.
    pub type_name: String,
    pub library: String,
    pub parent: Option<ModuleId>,
    pub children: Vec<ModuleId>,
    /// Resources this instance canonically owns.
    pub owns: Vec<ResourceId>,
    pub proxies: Vec<Proxy>,
    pub edges: Vec<PortEdge>,
}

// ── Netlist ─────────────────────────────────────────────────────────────────

/// The structural hierarchy for one function's generated circuit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructuralNetlist {
    top: Option<ModuleId>,
    modules: IndexMap<ModuleId, ModuleInstance>,
    resources: IndexMap<ResourceId, SharedResource>,
    next_module: u32,
    next_resource: u32,
}

impl StructuralNetlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a shared resource and return its id.
    pub fn new_resource(&mut self, name: impl Into<String>, kind: ResourceKind) -> ResourceId {
        let id = ResourceId(self.next_resource);
        self.next_resource += 1;
        self.resources.insert(
            id,
            SharedResource {
                id,
                name: name.into(),
                kind,
            },
        );
        id
    }

    /// Instantiate a module. The first instance added becomes the top.
    pub fn new_module(
        &mut self,
        name: impl Into<String>,
        type_name: impl Into<String>,
        library: impl Into<String>,
        parent: Option<ModuleId>,
    ) -> ModuleId {
        let id = ModuleId(self.next_module);
        self.next_module += 1;
        self.modules.insert(
            id,
            ModuleInstance {
                id,
                name: name.into(),
                type_name: type_name.into(),
                library: library.into(),
                parent,
                children: Vec::new(),
                owns: Vec::new(),
                proxies: Vec::new(),
                edges: Vec::new(),
            },
        );
        if let Some(p) = parent {
            if let Some(parent_mod) = self.modules.get_mut(&p) {
                parent_mod.children.push(id);
            }
        } else if self.top.is_none() {
            self.top = Some(id);
        }
        id
    }

    pub fn top(&self) -> Option<ModuleId> {
        self.top
    }

    pub fn module(&self, id: ModuleId) -> Option<&ModuleInstance> {
        self.modules.get(&id)
    }

    pub fn module_mut(&mut self, id: ModuleId) -> Option<&mut ModuleInstance> {
        self.modules.get_mut(&id)
    }

    /// All instances, in instantiation order.
    pub fn modules(&self) -> impl Iterator<Item = &ModuleInstance> {
        self.modules.values()
    }

    pub fn module_ids(&self) -> Vec<ModuleId> {
        self.modules.keys().copied().collect()
    }

    pub fn resource(&self, id: ResourceId) -> Option<&SharedResource> {
        self.resources.get(&id)
    }

    pub fn resources(&self) -> impl Iterator<Item = &SharedResource> {
        self.resources.values()
    }

    /// The single instance owning `resource`, if any (instantiation order
    /// breaks the tie should configuration list several).
    pub fn canonical_owner(&self, resource: ResourceId) -> Option<ModuleId> {
        self.modules
            .values()
            .find(|m| m.owns.contains(&resource))
            .map(|m| m.id)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DEFAULT_LIBRARY, WORK_LIBRARY};

    #[test]
    fn first_parentless_module_is_top() {
        let mut n = StructuralNetlist::new();
        let top = n.new_module("top", "main_dp", WORK_LIBRARY, None);
        let child = n.new_module("top.m0", "mult16", DEFAULT_LIBRARY, Some(top));
        assert_eq!(n.top(), Some(top));
        assert_eq!(n.module(top).unwrap().children, vec![child]);
        assert_eq!(n.module(child).unwrap().parent, Some(top));
    }

    #[test]
    fn canonical_owner_lookup() {
        let mut n = StructuralNetlist::new();
        let top = n.new_module("top", "main_dp", WORK_LIBRARY, None);
        let owner = n.new_module("top.mem", "bram_ctrl", DEFAULT_LIBRARY, Some(top));
        let mem = n.new_resource("mem0", ResourceKind::Memory);
        n.module_mut(owner).unwrap().owns.push(mem);

        assert_eq!(n.canonical_owner(mem), Some(owner));
        let orphan = n.new_resource("mem1", ResourceKind::Memory);
        assert_eq!(n.canonical_owner(orphan), None);
    }

    #[test]
    fn serde_round_trip() {
        let mut n = StructuralNetlist::new();
        let top = n.new_module("top", "main_dp", WORK_LIBRARY, None);
        let mem = n.new_resource("mem0", ResourceKind::Memory);
        let user = n.new_module("top.f_0", "callee", DEFAULT_LIBRARY, Some(top));
        n.module_mut(user).unwrap().proxies.push(Proxy {
            resource: mem,
            port_name: "mem0_proxy".to_string(),
        });

        let json = serde_json::to_string(&n).unwrap();
        let back: StructuralNetlist = serde_json::from_str(&json).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back.module(user).unwrap().proxies.len(), 1);
    }
}
