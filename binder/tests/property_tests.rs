// Property-based tests for binding invariants.
//
// Three categories:
// 1. Compatibility weights: symmetry, range, call-order independence
// 2. Instance assignment: no overlapping share, pool respected when no
//    capacity warning was raised
// 3. Persistence: save → load restores the exact binding and schedule
//
// Uses proptest with explicit configuration to prevent CI flakiness.

use proptest::prelude::*;

use hbc::assign::{assign_instances, select_fu_types};
use hbc::binding::{verify_binding, FuBinding, FuInstance};
use hbc::catalog::{AllocationCatalog, FuSpec, FuType, FuTypeId};
use hbc::diag::codes;
use hbc::graph::{OpKind, Operation, OperationGraph};
use hbc::id::{OpId, ValueId};
use hbc::milp::SolverConfig;
use hbc::persist;
use hbc::schedule::Schedule;
use hbc::storage::{build_storage_values, CompatibilityModel};

// ── Generators ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct OpSketch {
    kind: u8,
    use_picks: Vec<prop::sample::Index>,
    bound: Option<(u8, Option<u8>)>,
    step: u8,
}

fn arb_sketches(max_ops: usize) -> impl Strategy<Value = Vec<OpSketch>> {
    prop::collection::vec(
        (
            0u8..6,
            prop::collection::vec(any::<prop::sample::Index>(), 0..3),
            prop::option::of((0u8..3, prop::option::of(0u8..3))),
            0u8..8,
        )
            .prop_map(|(kind, use_picks, bound, step)| OpSketch {
                kind,
                use_picks,
                bound,
                step,
            }),
        1..max_ops,
    )
}

fn kind_of(code: u8) -> OpKind {
    match code {
        0 => OpKind::Merge,
        1 => OpKind::Add,
        2 => OpKind::Mul,
        3 => OpKind::Assign,
        4 => OpKind::Load,
        _ => OpKind::Sub,
    }
}

/// Materialize a sketch into graph + schedule + binding, against a catalog
/// that already holds the three FU types the sketches may reference.
fn build(sketches: &[OpSketch]) -> (OperationGraph, Schedule, FuBinding, AllocationCatalog) {
    let mut catalog = AllocationCatalog::new();
    for name in ["fu_a", "fu_b", "fu_c"] {
        catalog.register(FuType::std(name), FuSpec::default()).unwrap();
    }

    let mut graph = OperationGraph::new();
    let mut schedule = Schedule::new();
    let mut binding = FuBinding::new();

    for (i, sk) in sketches.iter().enumerate() {
        let kind = kind_of(sk.kind);
        let uses: Vec<ValueId> = if i == 0 {
            Vec::new()
        } else {
            sk.use_picks
                .iter()
                .map(|pick| ValueId(pick.index(i) as u32))
                .collect()
        };
        let id = OpId(i as u32);
        graph
            .insert(Operation {
                id,
                name: format!("op_{i}"),
                kind: kind.clone(),
                defs: vec![ValueId(i as u32)],
                uses,
            })
            .unwrap();
        schedule.set_execution(id, sk.step as u32);

        if kind.is_artificial() {
            continue;
        }
        if let Some((fu, inst)) = sk.bound {
            let instance = match inst {
                None => FuInstance::Unbound,
                Some(idx) => FuInstance::Index(idx as u32),
            };
            binding.bind(id, FuTypeId(fu as u32), instance);
        }
    }

    (graph, schedule, binding, catalog)
}

// ── Compatibility-weight properties ─────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 96,
        .. ProptestConfig::default()
    })]

    #[test]
    fn weights_are_symmetric_in_range_and_stable(sketches in arb_sketches(12)) {
        let (graph, _schedule, binding, _catalog) = build(&sketches);
        let storage = build_storage_values(&graph);
        let model = CompatibilityModel::new(&graph, &binding, &storage);

        let ids: Vec<_> = storage.iter().map(|sv| sv.id).collect();
        for (i, &a) in ids.iter().enumerate() {
            for &b in &ids[i + 1..] {
                let w_ab = model.get_compatibility_weight(a, b);
                let w_ba = model.get_compatibility_weight(b, a);
                prop_assert_eq!(w_ab, w_ba, "weight must be symmetric");
                prop_assert!((1..=5).contains(&w_ab), "weight {} out of range", w_ab);
                // out-of-order re-query returns the same answer
                prop_assert_eq!(model.get_compatibility_weight(a, b), w_ab);
            }
        }
    }
}

// ── Assignment properties ───────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 96,
        .. ProptestConfig::default()
    })]

    #[test]
    fn assignment_never_overlaps_and_respects_unstressed_pools(
        steps in prop::collection::vec(0u32..6, 1..10),
        pool in 1u32..4,
    ) {
        let mut catalog = AllocationCatalog::new();
        let fu = catalog
            .register(
                FuType::std("mult16"),
                FuSpec { allocation: pool, area: 4.0, latency: 1, composition: vec![] },
            )
            .unwrap();
        catalog.add_candidate("mul", fu);

        let mut graph = OperationGraph::new();
        let mut schedule = Schedule::new();
        for (i, &step) in steps.iter().enumerate() {
            let id = OpId(i as u32);
            graph
                .insert(Operation {
                    id,
                    name: format!("mul_{i}"),
                    kind: OpKind::Mul,
                    defs: vec![ValueId(i as u32)],
                    uses: vec![],
                })
                .unwrap();
            schedule.set_execution(id, step);
        }

        let mut binding = FuBinding::new();
        let diags = select_fu_types(&graph, &catalog, &mut binding);
        prop_assert!(diags.is_empty());
        let result = assign_instances(
            &graph,
            &schedule,
            &catalog,
            &mut binding,
            &SolverConfig::default(),
        );

        let cert = verify_binding(&binding, &schedule, &catalog);
        // the algorithm never time-multiplexes overlapping occupancy
        prop_assert!(cert.b2_no_overlapping_share);
        // and only exceeds the pool when it said so
        let overflow_reported = result
            .diagnostics
            .iter()
            .any(|d| d.code == Some(codes::W0501));
        prop_assert_eq!(cert.b1_allocation_respected, !overflow_reported);

        // every scheduled operation ended up on a concrete instance
        for op in graph.ops() {
            prop_assert!(binding.get_index(op.id).is_concrete());
        }
    }
}

// ── Persistence properties ──────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 96,
        .. ProptestConfig::default()
    })]

    #[test]
    fn save_load_restores_binding_and_schedule(sketches in arb_sketches(12)) {
        let (graph, schedule, binding, mut catalog) = build(&sketches);
        let doc = persist::save(&graph, &schedule, &binding, &catalog);
        let loaded = persist::load(&doc, &graph, &mut catalog);
        prop_assert!(loaded.diagnostics.is_empty());

        for op in graph.ops() {
            prop_assert_eq!(
                loaded.binding.get_assign(op.id),
                binding.get_assign(op.id),
                "fu type must round-trip for '{}'",
                op.name
            );
            prop_assert_eq!(
                loaded.binding.get_index(op.id),
                binding.get_index(op.id),
                "fu instance must round-trip for '{}'",
                op.name
            );
            if binding.get_assign(op.id).is_some() {
                prop_assert_eq!(
                    loaded.schedule.get_cstep(op.id),
                    schedule.get_cstep(op.id)
                );
            }
        }

        // a second save of the loaded state is byte-identical
        let resaved = persist::save(&graph, &loaded.schedule, &loaded.binding, &catalog);
        prop_assert_eq!(persist::fingerprint(&resaved), persist::fingerprint(&doc));
    }
}
