// binding.rs — Functional-unit binding bookkeeping
//
// Owns the authoritative Operation → FU-instance map, its reverse index,
// and the monotonic allocation accumulator. The assignment *algorithm*
// lives in assign.rs; this module only records and answers.
//
// Preconditions: none.
// Postconditions: forward map, reverse map, and allocation counts stay
//                 mutually consistent across arbitrary bind sequences.
// Failure modes: none (lookups are fail-soft; misuse is caught by
//                `verify_binding` in tests).
// Side effects: none.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};

use crate::catalog::{AllocationCatalog, FuTypeId};
use crate::id::OpId;
use crate::pass::StageCert;
use crate::schedule::{occupancy, overlaps, Schedule};

// ── FU instance ─────────────────────────────────────────────────────────────

/// One physical copy of an FU type: either a slot in the type's shared
/// instance pool, or an unshared unit of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FuInstance {
    /// Unique, unshared instance — no pool index.
    Unbound,
    /// Slot `i` of the type's shared pool.
    Index(u32),
}

impl FuInstance {
    pub fn is_concrete(&self) -> bool {
        matches!(self, FuInstance::Index(_))
    }
}

// ── Allocation accumulator ──────────────────────────────────────────────────

/// Tracks, per FU type, how many instances must be physically generated.
///
/// Contract: counts never decrease. Overwriting a binding with an
/// equal-or-lower instance index must still leave enough physical copies
/// for every index ever handed out.
#[derive(Debug, Clone, Default)]
pub struct AllocationCounts {
    counts: IndexMap<FuTypeId, u32>,
}

impl AllocationCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the count for `fu` to at least `n`. Lower values are ignored.
    pub fn raise(&mut self, fu: FuTypeId, n: u32) {
        let entry = self.counts.entry(fu).or_insert(0);
        if n > *entry {
            log::trace!("allocation for fu type {} raised to {}", fu.0, n);
            *entry = n;
        }
    }

    /// Instances to generate for `fu`; zero when the type was never bound.
    pub fn get(&self, fu: FuTypeId) -> u32 {
        self.counts.get(&fu).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (FuTypeId, u32)> + '_ {
        self.counts.iter().map(|(&fu, &n)| (fu, n))
    }
}

// ── FU binding ──────────────────────────────────────────────────────────────

/// The Operation → FU-instance map for one function, with reverse index.
#[derive(Debug, Clone, Default)]
pub struct FuBinding {
    assign: IndexMap<OpId, (FuTypeId, FuInstance)>,
    reverse: HashMap<(FuTypeId, FuInstance), IndexSet<OpId>>,
    allocation: AllocationCounts,
}

impl FuBinding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `op` executes on `(fu, instance)`. Re-binding an
    /// operation moves it; allocation counts only ever rise.
    pub fn bind(&mut self, op: OpId, fu: FuTypeId, instance: FuInstance) {
        if let Some(&(old_fu, old_inst)) = self.assign.get(&op) {
            if let Some(set) = self.reverse.get_mut(&(old_fu, old_inst)) {
                set.shift_remove(&op);
            }
        }
        self.assign.insert(op, (fu, instance));
        self.reverse.entry((fu, instance)).or_default().insert(op);

        // every type bound at least once needs one physical copy
        let needed = match instance {
            FuInstance::Unbound => 1,
            FuInstance::Index(i) => i + 1,
        };
        self.allocation.raise(fu, needed);
    }

    /// The FU type `op` is bound to, or `None` while unbound.
    pub fn get_assign(&self, op: OpId) -> Option<FuTypeId> {
        self.assign.get(&op).map(|&(fu, _)| fu)
    }

    /// The instance `op` is bound to; `Unbound` doubles as the
    /// "unknown" answer for operations not yet bound.
    pub fn get_index(&self, op: OpId) -> FuInstance {
        self.assign
            .get(&op)
            .map(|&(_, inst)| inst)
            .unwrap_or(FuInstance::Unbound)
    }

    /// The physical slot `op` occupies, when bound to a concrete index.
    pub fn slot_of(&self, op: OpId) -> Option<(FuTypeId, u32)> {
        match self.assign.get(&op) {
            Some(&(fu, FuInstance::Index(i))) => Some((fu, i)),
            _ => None,
        }
    }

    /// Operations sharing one hardware instance, in binding order.
    pub fn get_operations(
        &self,
        fu: FuTypeId,
        instance: FuInstance,
    ) -> impl Iterator<Item = OpId> + '_ {
        self.reverse
            .get(&(fu, instance))
            .into_iter()
            .flatten()
            .copied()
    }

    /// All bound operations with their assignments, in binding order.
    pub fn bound_ops(&self) -> impl Iterator<Item = (OpId, FuTypeId, FuInstance)> + '_ {
        self.assign.iter().map(|(&op, &(fu, inst))| (op, fu, inst))
    }

    /// Operations currently bound to `fu`, any instance.
    pub fn ops_on_type(&self, fu: FuTypeId) -> usize {
        self.assign.values().filter(|&&(f, _)| f == fu).count()
    }

    pub fn allocation(&self) -> &AllocationCounts {
        &self.allocation
    }

    /// True iff genuine multiplexed sharing is present: some concrete
    /// instance serves more than one operation (not just 1:1 instancing).
    /// Downstream, this decides whether a multiplexing network is
    /// generated at all.
    pub fn has_resource_sharing(&self) -> bool {
        self.reverse
            .iter()
            .any(|((_, inst), ops)| inst.is_concrete() && ops.len() > 1)
    }

    pub fn len(&self) -> usize {
        self.assign.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assign.is_empty()
    }
}

// ── Verification ────────────────────────────────────────────────────────────

/// Machine-checkable evidence for binding postconditions.
#[derive(Debug, Clone)]
pub struct BindCert {
    /// B1: distinct concrete instance indices per type never exceed the
    /// catalog's allocation number.
    pub b1_allocation_respected: bool,
    /// B2: no two operations with overlapping occupancy share one
    /// concrete (type, index) slot.
    pub b2_no_overlapping_share: bool,
}

impl StageCert for BindCert {
    fn all_pass(&self) -> bool {
        self.b1_allocation_respected && self.b2_no_overlapping_share
    }

    fn obligations(&self) -> Vec<(&'static str, bool)> {
        vec![
            ("B1_allocation_respected", self.b1_allocation_respected),
            ("B2_no_overlapping_share", self.b2_no_overlapping_share),
        ]
    }
}

/// Verify binding postconditions against a schedule and catalog.
pub fn verify_binding(
    binding: &FuBinding,
    schedule: &Schedule,
    catalog: &AllocationCatalog,
) -> BindCert {
    BindCert {
        b1_allocation_respected: verify_b1(binding, catalog),
        b2_no_overlapping_share: verify_b2(binding, schedule, catalog),
    }
}

/// B1: per type, count distinct concrete indices in use.
fn verify_b1(binding: &FuBinding, catalog: &AllocationCatalog) -> bool {
    let mut used: HashMap<FuTypeId, IndexSet<u32>> = HashMap::new();
    for (_, fu, inst) in binding.bound_ops() {
        if let FuInstance::Index(i) = inst {
            used.entry(fu).or_default().insert(i);
        }
    }
    used.iter().all(|(fu, indices)| {
        let limit = catalog.spec(*fu).map(|s| s.allocation).unwrap_or(1);
        indices.len() as u32 <= limit
    })
}

/// B2: within one concrete slot, occupancy intervals are pairwise disjoint.
fn verify_b2(binding: &FuBinding, schedule: &Schedule, catalog: &AllocationCatalog) -> bool {
    let mut slots: HashMap<(FuTypeId, u32), Vec<(u32, u32)>> = HashMap::new();
    for (op, fu, inst) in binding.bound_ops() {
        let FuInstance::Index(i) = inst else { continue };
        let Some(step) = schedule.get_cstep(op) else {
            continue;
        };
        let latency = catalog.spec(fu).map(|s| s.latency).unwrap_or(1);
        slots.entry((fu, i)).or_default().push(occupancy(step, latency));
    }
    for intervals in slots.values() {
        for (i, a) in intervals.iter().enumerate() {
            for b in &intervals[i + 1..] {
                if overlaps(*a, *b) {
                    return false;
                }
            }
        }
    }
    true
}

// ── Tests ───────────────────────────────────────────────────────────────────
