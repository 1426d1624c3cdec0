// assign.rs — FU type selection and instance assignment
//
// Fills in the binding map: every real operation gets an FU type from the
// catalog's candidate list, then every scheduled operation gets a concrete
// instance index within its type's pool. Assignment is exact where
// practical — a 0/1 assignment program solved through the MILP abstraction
// — and falls back to a deterministic first-fit heuristic when the solver
// gives up or the problem is too large to be worth encoding.
//
// Preconditions: `schedule` covers the operations to be assigned; the
//                catalog knows every type the binding references.
// Postconditions: every scheduled, type-bound operation has a concrete
//                 instance index; allocation counts cover all indices.
// Failure modes: a real operation without any FU candidate produces an
//                `E0100` diagnostic; solver fallbacks produce `W0500`.
// Side effects: mutates `binding`.

use std::collections::BTreeMap;

use indexmap::IndexMap;

use crate::binding::{FuBinding, FuInstance};
use crate::catalog::{AllocationCatalog, FuTypeId};
use crate::diag::{codes, DiagLevel, Diagnostic};
use crate::graph::OperationGraph;
use crate::id::OpId;
use crate::milp::{create_solver, MilpSolver, ObjDir, RowSense, SolveStatus, SolverConfig};
use crate::schedule::{occupancy, overlaps, Schedule};

/// Above this many operations on one type, the ILP encoding is skipped and
/// first-fit used directly.
pub const MAX_ILP_OPS: usize = 12;

/// Result of an assignment pass.
#[derive(Debug, Default)]
pub struct AssignResult {
    pub diagnostics: Vec<Diagnostic>,
    /// FU types whose pools were assigned by the exact solver.
    pub exact_types: usize,
    /// FU types assigned by the first-fit heuristic.
    pub heuristic_types: usize,
}

// ── Type selection ──────────────────────────────────────────────────────────

/// Give every real, not-yet-bound operation an FU type: the cheapest
/// candidate by area (declaration order breaks ties). Artificial
/// operations are structural glue and stay unbound.
pub fn select_fu_types(
    graph: &OperationGraph,
    catalog: &AllocationCatalog,
    binding: &mut FuBinding,
) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    for op in graph.ops() {
        if op.kind.is_artificial() || binding.get_assign(op.id).is_some() {
            continue;
        }
        let candidates = catalog.candidates_for(op);
        let Some(&fu) = candidates.iter().min_by(|a, b| {
            let area = |id: &&FuTypeId| catalog.spec(**id).map(|s| s.area).unwrap_or(f64::MAX);
            area(a).partial_cmp(&area(b)).unwrap_or(std::cmp::Ordering::Equal)
        }) else {
            diagnostics.push(
                Diagnostic::new(
                    DiagLevel::Error,
                    format!(
                        "no functional-unit candidate for operation '{}' (kind '{}')",
                        op.name,
                        op.kind.key()
                    ),
                )
                .with_code(codes::E0100)
                .with_subject(op.name.clone()),
            );
            continue;
        };
        binding.bind(op.id, fu, FuInstance::Unbound);
    }

    diagnostics
}

// ── Instance assignment ─────────────────────────────────────────────────────

/// Assign a concrete pool index to every scheduled, type-bound operation.
pub fn assign_instances(
    graph: &OperationGraph,
    schedule: &Schedule,
    catalog: &AllocationCatalog,
    binding: &mut FuBinding,
    config: &SolverConfig,
) -> AssignResult {
    let mut result = AssignResult::default();

    // group by type, in binding order for determinism
    let mut by_type: IndexMap<FuTypeId, Vec<OpId>> = IndexMap::new();
    for (op, fu, _) in binding.bound_ops() {
        if schedule.is_scheduled(op) {
            by_type.entry(fu).or_default().push(op);
        }
    }

    for (fu, mut ops) in by_type {
        ops.sort_by_key(|&op| (schedule.get_cstep(op).unwrap_or(u32::MAX), op));

        let spec = catalog.spec(fu);
        let pool = spec.map(|s| s.allocation).unwrap_or(1).max(1) as usize;
        let latency = spec.map(|s| s.latency).unwrap_or(1);
        let area = spec.map(|s| s.area).unwrap_or(1.0);

        // pool at least as large as the operation count: indices in
        // schedule order, no conflict possible
        if ops.len() <= pool {
            for (i, &op) in ops.iter().enumerate() {
                binding.bind(op, fu, FuInstance::Index(i as u32));
            }
            continue;
        }

        let intervals: Vec<(u32, u32)> = ops
            .iter()
            .map(|&op| occupancy(schedule.get_cstep(op).unwrap_or(0), latency))
            .collect();

        if ops.len() <= MAX_ILP_OPS {
            match assign_exact(&ops, &intervals, pool, area, fu, binding, config) {
                Ok(()) => {
                    result.exact_types += 1;
                    continue;
                }
                Err(status) => {
                    let fu_name = catalog
                        .fu_type(fu)
                        .map(|t| t.name.clone())
                        .unwrap_or_else(|| format!("fu#{}", fu.0));
                    match status {
                        SolveStatus::Infeasible => {
                            log::debug!("assignment program for '{}' is infeasible", fu_name)
                        }
                        other => log::warn!(
                            "assignment solver gave up on '{}' ({:?})",
                            fu_name,
                            other
                        ),
                    }
                    result.diagnostics.push(
                        Diagnostic::new(
                            DiagLevel::Warning,
                            format!(
                                "exact instance assignment for '{}' unavailable; \
                                 using first-fit",
                                fu_name
                            ),
                        )
                        .with_code(codes::W0500)
                        .with_subject(fu_name),
                    );
                }
            }
        } else {
            log::debug!(
                "{} operations on one type exceed the ILP size cap; using first-fit",
                ops.len()
            );
        }

        let opened = assign_first_fit(&ops, &intervals, fu, binding);
        result.heuristic_types += 1;
        if opened > pool {
            let fu_name = catalog
                .fu_type(fu)
                .map(|t| t.name.clone())
                .unwrap_or_else(|| format!("fu#{}", fu.0));
            result.diagnostics.push(
                Diagnostic::new(
                    DiagLevel::Warning,
                    format!(
                        "first-fit needed {} instances of '{}' but the catalog \
                         allocates {}",
                        opened, fu_name, pool
                    ),
                )
                .with_code(codes::W0501)
                .with_subject(fu_name),
            );
        }
    }

    result
}

/// Encode the per-type assignment as a 0/1 program and bind from its
/// solution. Variables: `x[o][i]` (operation `o` on pool slot `i`) and
/// `used[i]` indicators; one-hot rows per operation, mutual-exclusion rows
/// per conflicting pair and slot, coupling rows `x[o][i] ≤ used[i]`;
/// objective minimizes area-weighted slot usage.
fn assign_exact(
    ops: &[OpId],
    intervals: &[(u32, u32)],
    pool: usize,
    area: f64,
    fu: FuTypeId,
    binding: &mut FuBinding,
    config: &SolverConfig,
) -> Result<(), SolveStatus> {
    let n = ops.len();
    let x = |o: usize, i: usize| o * pool + i;
    let used = |i: usize| n * pool + i;

    let mut solver = create_solver(config);
    solver.make(n * pool + pool);
    for v in 0..n * pool + pool {
        solver.set_binary(v);
    }

    for o in 0..n {
        let row: BTreeMap<usize, f64> = (0..pool).map(|i| (x(o, i), 1.0)).collect();
        solver.add_row(&row, 1.0, RowSense::Eq, &format!("assign_op{}", ops[o].0));
    }

    for a in 0..n {
        for b in a + 1..n {
            if !overlaps(intervals[a], intervals[b]) {
                continue;
            }
            for i in 0..pool {
                let row: BTreeMap<usize, f64> = [(x(a, i), 1.0), (x(b, i), 1.0)].into();
                solver.add_row(
                    &row,
                    1.0,
                    RowSense::Le,
                    &format!("excl_op{}_op{}_slot{}", ops[a].0, ops[b].0, i),
                );
            }
        }
    }

    for o in 0..n {
        for i in 0..pool {
            let row: BTreeMap<usize, f64> = [(x(o, i), 1.0), (used(i), -1.0)].into();
            solver.add_row(&row, 0.0, RowSense::Le, &format!("use_op{}_slot{}", ops[o].0, i));
        }
    }

    let objective: BTreeMap<usize, f64> = (0..pool).map(|i| (used(i), area)).collect();
    solver.objective_add(&objective, ObjDir::Minimize);

    let status = solver.solve_ilp();
    if !status.has_solution() {
        return Err(status);
    }

    let mut solution = std::collections::HashMap::new();
    solver.vars_solution(&mut solution);
    for o in 0..n {
        for i in 0..pool {
            if solution.get(&x(o, i)).copied().unwrap_or(0.0) > 0.5 {
                binding.bind(ops[o], fu, FuInstance::Index(i as u32));
                break;
            }
        }
    }
    Ok(())
}

/// Deterministic first-fit: operations in control-step order, each placed
/// on the lowest-indexed instance whose occupancy stays disjoint. Opens a
/// new instance when none fits — even past the catalog pool, so that
/// enough physical copies are generated; the capacity warning is the
/// caller's to raise.
fn assign_first_fit(
    ops: &[OpId],
    intervals: &[(u32, u32)],
    fu: FuTypeId,
    binding: &mut FuBinding,
) -> usize {
    let mut instances: Vec<Vec<(u32, u32)>> = Vec::new();

    for (&op, &interval) in ops.iter().zip(intervals) {
        let slot = instances
            .iter()
            .position(|busy| busy.iter().all(|&b| !overlaps(interval, b)));
        let idx = match slot {
            Some(i) => i,
            None => {
                instances.push(Vec::new());
                instances.len() - 1
            }
        };
        instances[idx].push(interval);
        binding.bind(op, fu, FuInstance::Index(idx as u32));
    }

    instances.len()
}

// ── Tests ───────────────────────────────────────────────────────────────────
