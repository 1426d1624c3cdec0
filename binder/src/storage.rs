// storage.rs — Storage values and the register-sharing compatibility model
//
// One storage value per SSA-defined scalar value. The compatibility model
// scores unordered pairs of storage values on the fixed scale {1..5}; the
// external register allocator reads the score as an affinity-edge weight
// (higher ⇒ stronger preference to share one register).
//
// Preconditions: `graph` and `binding` describe the same function; the
//                storage set was built from that graph.
// Postconditions: weights are symmetric, deterministic, and independent of
//                 query order.
// Failure modes: unknown storage ids score 1 (no incentive), never panic.
// Side effects: none — the model is pure and safely callable O(n²) times.

use std::collections::{HashMap, HashSet};

use crate::binding::{FuBinding, FuInstance};
use crate::catalog::FuTypeId;
use crate::graph::OperationGraph;
use crate::id::{OpId, StorageId, ValueId};

// ── Storage values ──────────────────────────────────────────────────────────

/// A scalar value that needs a register across its liveness window.
/// The defining operation is fixed at creation and never re-pointed.
#[derive(Debug, Clone)]
pub struct StorageValue {
    pub id: StorageId,
    /// The defined variable this storage value stands for.
    pub variable: ValueId,
    pub bit_width: u32,
    /// Back-reference to the unique defining operation.
    pub def_op: OpId,
}

/// The storage values live in one function, indexed by defined variable.
#[derive(Debug, Default)]
pub struct StorageSet {
    values: Vec<StorageValue>,
    by_value: HashMap<ValueId, StorageId>,
}

impl StorageSet {
    pub fn value(&self, id: StorageId) -> Option<&StorageValue> {
        self.values.get(id.0 as usize)
    }

    pub fn storage_of(&self, variable: ValueId) -> Option<StorageId> {
        self.by_value.get(&variable).copied()
    }

    /// All storage values, in creation (graph insertion) order.
    pub fn iter(&self) -> impl Iterator<Item = &StorageValue> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Create one storage value per defined scalar value, in graph insertion
/// order so storage ids are deterministic.
pub fn build_storage_values(graph: &OperationGraph) -> StorageSet {
    let mut set = StorageSet::default();
    for op in graph.ops() {
        for &v in &op.defs {
            let id = StorageId(set.values.len() as u32);
            set.values.push(StorageValue {
                id,
                variable: v,
                bit_width: graph.value_width(v),
                def_op: op.id,
            });
            set.by_value.insert(v, id);
        }
    }
    set
}

// ── Compatibility model ─────────────────────────────────────────────────────

/// Scores register-sharing affinity between storage values. Borrowed view
/// over the session's graph, binding, and storage set.
pub struct CompatibilityModel<'a> {
    graph: &'a OperationGraph,
    binding: &'a FuBinding,
    storage: &'a StorageSet,
}

impl<'a> CompatibilityModel<'a> {
    pub fn new(graph: &'a OperationGraph, binding: &'a FuBinding, storage: &'a StorageSet) -> Self {
        Self {
            graph,
            binding,
            storage,
        }
    }

    /// Compatibility weight for an unordered pair of storage values.
    ///
    /// The rule chain, strongest evidence first; the order is load-bearing:
    /// a provable same-slot share (5) must win over the inferred
    /// common-input relationship (4).
    ///
    ///   5 — merge-operand affinity (sharing removes a copy), or both
    ///       definers feed a multiplier (sharing avoids steering logic),
    ///       or both definers occupy the identical concrete FU slot.
    ///   1 — different FU types, or distinct concrete copies of one type.
    ///   4 — same type, both unindexed, inputs trace to a common slot.
    ///   3 — same type, both unindexed, adjacent in the dataflow.
    ///   2 — same type, no structural relationship.
    pub fn get_compatibility_weight(&self, a: StorageId, b: StorageId) -> u32 {
        let (Some(sva), Some(svb)) = (self.storage.value(a), self.storage.value(b)) else {
            return 1;
        };
        let da = sva.def_op;
        let db = svb.def_op;

        // merge-operand affinity, either direction
        if self.merge_reads(da, svb.variable) || self.merge_reads(db, sva.variable) {
            return 5;
        }
        // both results steered into multiplication units
        if self.feeds_multiplier(da) && self.feeds_multiplier(db) {
            return 5;
        }

        let (Some(fa), Some(fb)) = (self.binding.get_assign(da), self.binding.get_assign(db))
        else {
            return 1;
        };
        if fa != fb {
            return 1;
        }

        match (self.binding.get_index(da), self.binding.get_index(db)) {
            (FuInstance::Index(i), FuInstance::Index(j)) => {
                // identical concrete slot is provably the same physical
                // unit in cycle-disjoint use; distinct copies save nothing
                return if i == j { 5 } else { 1 };
            }
            (FuInstance::Index(_), FuInstance::Unbound)
            | (FuInstance::Unbound, FuInstance::Index(_)) => return 1,
            (FuInstance::Unbound, FuInstance::Unbound) => {}
        }

        if self.common_input_slot(da, db) {
            return 4;
        }
        if self.reads(da, svb.variable) || self.reads(db, sva.variable) {
            return 3;
        }
        2
    }

    /// True when `op` is a merge reading `value` as a direct operand.
    fn merge_reads(&self, op: OpId, value: ValueId) -> bool {
        self.graph
            .op(op)
            .map(|o| o.kind.is_merge() && o.uses.contains(&value))
            .unwrap_or(false)
    }

    fn reads(&self, op: OpId, value: ValueId) -> bool {
        self.graph
            .op(op)
            .map(|o| o.uses.contains(&value))
            .unwrap_or(false)
    }

    /// True when any direct successor of `op` is a multiplication.
    fn feeds_multiplier(&self, op: OpId) -> bool {
        self.graph
            .direct_successors(op)
            .iter()
            .any(|&s| self.graph.op(s).map(|o| o.kind.is_mul()).unwrap_or(false))
    }

    /// True when the two operations' input values trace back, through
    /// definers without a concrete slot, to a common (type, index) unit.
    fn common_input_slot(&self, a: OpId, b: OpId) -> bool {
        let slots_a = self.input_slots(a);
        if slots_a.is_empty() {
            return false;
        }
        let slots_b = self.input_slots(b);
        !slots_a.is_disjoint(&slots_b)
    }

    fn input_slots(&self, op: OpId) -> HashSet<(FuTypeId, u32)> {
        let mut slots = HashSet::new();
        let mut visited = HashSet::new();
        self.collect_input_slots(op, &mut slots, &mut visited);
        slots
    }

    fn collect_input_slots(
        &self,
        op: OpId,
        slots: &mut HashSet<(FuTypeId, u32)>,
        visited: &mut HashSet<OpId>,
    ) {
        if !visited.insert(op) {
            return;
        }
        let Some(operation) = self.graph.op(op) else {
            return;
        };
        for &v in &operation.uses {
            let Some(def) = self.graph.defining_op(v) else {
                continue;
            };
            if let Some(slot) = self.binding.slot_of(def) {
                slots.insert(slot);
            } else {
                // look through artificial or not-yet-indexed definers
                self.collect_input_slots(def, slots, visited);
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
