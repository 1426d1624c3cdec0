// id.rs — Stable semantic identifiers for binding artifacts
//
// These IDs provide deterministic, name-independent identity for the
// structures a binding session manipulates. Allocated in graph insertion
// order, ensuring deterministic assignment across runs.

use serde::{Deserialize, Serialize};

/// Stable identifier for an operation in the scheduled dataflow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OpId(pub u32);

/// Stable identifier for a scalar value (SSA-like: at most one definition).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueId(pub u32);

/// Stable identifier for a storage value (one per defined scalar value).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StorageId(pub u32);

/// Stable identifier for a module instance in the structural hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleId(pub u32);

/// Stable identifier for a shared structural resource (memory or callee).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId(pub u32);

/// Allocator for graph-side IDs. Produces monotonically increasing IDs in
/// allocation order. Module/resource IDs are handed out by the structural
/// netlist itself.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next_op: u32,
    next_value: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_op(&mut self) -> OpId {
        let id = OpId(self.next_op);
        self.next_op += 1;
        id
    }

    pub fn alloc_value(&mut self) -> ValueId {
        let id = ValueId(self.next_value);
        self.next_value += 1;
        id
    }
}
