// pass.rs — Binding-stage descriptors and verification certs
//
// Declares the session's semantic stages, their dependency edges, and the
// shared cert trait stage verifiers implement. The driver uses
// `required_stages` to run the minimal stage subset for a terminal stage.

use std::collections::HashSet;

// ── Stage identifiers ──────────────────────────────────────────────────────

/// Identifies each binding stage (persisted-document loading is outside the
/// runner; it replaces `BindFus` wholesale).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageId {
    BuildStorage,
    BindFus,
    ResolveProxies,
    Persist,
}

// ── Stage descriptor ───────────────────────────────────────────────────────

/// Static metadata about a binding stage.
pub struct StageDescriptor {
    /// Human-readable name for diagnostics/verbose output.
    pub name: &'static str,
    /// Stage dependencies (stages whose outputs this stage consumes).
    pub inputs: &'static [StageId],
    /// Pre/post conditions (documentation only).
    pub invariants: &'static str,
}

/// Return the static descriptor for a given stage.
pub fn descriptor(id: StageId) -> StageDescriptor {
    match id {
        StageId::BuildStorage => StageDescriptor {
            name: "build_storage",
            inputs: &[],
            invariants: "one storage value per defined scalar value",
        },
        StageId::BindFus => StageDescriptor {
            name: "bind_fus",
            inputs: &[],
            invariants: "every real operation has an FU type and instance",
        },
        StageId::ResolveProxies => StageDescriptor {
            name: "resolve_proxies",
            inputs: &[StageId::BindFus],
            invariants: "no edge targets a duplicate proxy; zero-ref proxies removed",
        },
        StageId::Persist => StageDescriptor {
            name: "persist",
            inputs: &[StageId::BindFus, StageId::ResolveProxies],
            invariants: "document round-trips to an identical binding",
        },
    }
}

/// All stage IDs in execution order (used for iteration).
pub const ALL_STAGES: [StageId; 4] = [
    StageId::BuildStorage,
    StageId::BindFus,
    StageId::ResolveProxies,
    StageId::Persist,
];

/// Compute the minimal ordered set of stages needed to reach `terminal`.
/// Returns stages in topological (execution) order.
pub fn required_stages(terminal: StageId) -> Vec<StageId> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(terminal, &mut visited, &mut order);
    order
}

fn visit(id: StageId, visited: &mut HashSet<StageId>, order: &mut Vec<StageId>) {
    if !visited.insert(id) {
        return;
    }
    for &dep in descriptor(id).inputs {
        visit(dep, visited, order);
    }
    order.push(id);
}

// ── Stage cert trait ───────────────────────────────────────────────────────

/// Machine-checkable evidence for a stage's postconditions.
pub trait StageCert {
    fn all_pass(&self) -> bool;

    /// Named obligations with their outcomes, for verbose reporting.
    fn obligations(&self) -> Vec<(&'static str, bool)>;
}

// ── Tests ──────────────────────────────────────────────────────────────────
