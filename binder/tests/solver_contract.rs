// Solver-contract conformance tests.
//
// Exercises the MILP abstraction exactly as binding algorithms consume it:
// through the factory and the trait object, never a concrete type. The
// three canonical outcomes (optimal, infeasible, unbounded) plus budget
// exhaustion and problem-sequence reuse.

use std::collections::{BTreeMap, HashMap};

use hbc::milp::{create_solver, MilpSolver, ObjDir, RowSense, SolveStatus, SolverConfig};

fn solver() -> Box<dyn MilpSolver> {
    create_solver(&SolverConfig::default())
}

fn coeffs(pairs: &[(usize, f64)]) -> BTreeMap<usize, f64> {
    pairs.iter().copied().collect()
}

#[test]
fn degenerate_bound_solves_to_its_value() {
    let mut s = solver();
    s.make(1);
    s.set_bnds(0, 2.0, 2.0);
    assert_eq!(s.solve_ilp(), SolveStatus::Optimal);

    let mut out = HashMap::new();
    s.vars_solution(&mut out);
    assert_eq!(out[&0], 2.0);
}

#[test]
fn negative_cap_on_nonnegative_var_is_infeasible() {
    let mut s = solver();
    s.make(1);
    s.set_int(0);
    s.set_bnds(0, 0.0, f64::INFINITY);
    s.add_row(&coeffs(&[(0, 1.0)]), -1.0, RowSense::Le, "x_le_minus_one");
    assert_eq!(s.solve_ilp(), SolveStatus::Infeasible);
}

#[test]
fn unbounded_objective_is_reported_as_unbounded() {
    let mut s = solver();
    s.make(1);
    s.set_bnds(0, 0.0, f64::INFINITY);
    s.objective_add(&coeffs(&[(0, 1.0)]), ObjDir::Maximize);
    assert_eq!(s.solve_ilp(), SolveStatus::Unbounded);
}

#[test]
fn relaxation_agrees_on_trivial_problems() {
    let mut s = solver();
    s.make(1);
    s.set_bnds(0, 2.0, 2.0);
    assert_eq!(s.solve(), SolveStatus::Optimal);

    let mut out = HashMap::new();
    s.vars_solution(&mut out);
    assert_eq!(out[&0], 2.0);
}

#[test]
fn exhausted_budget_is_failed_never_a_hang() {
    let mut s = solver();
    s.make(30);
    for v in 0..30 {
        s.set_binary(v);
    }
    let all: BTreeMap<usize, f64> = (0..30).map(|v| (v, 1.0)).collect();
    s.add_row(&all, 15.0, RowSense::Eq, "half_on");
    s.set_max_seconds(1e-9);
    assert_eq!(s.solve_ilp(), SolveStatus::Failed);
}

#[test]
fn one_object_solves_a_sequence_of_problems() {
    let mut s = solver();

    s.make(1);
    s.set_bnds(0, 0.0, f64::INFINITY);
    s.objective_add(&coeffs(&[(0, 1.0)]), ObjDir::Maximize);
    assert_eq!(s.solve_ilp(), SolveStatus::Unbounded);

    // the second problem must see none of the first problem's state
    s.make(3);
    for v in 0..3 {
        s.set_binary(v);
    }
    s.add_row(
        &coeffs(&[(0, 1.0), (1, 1.0), (2, 1.0)]),
        1.0,
        RowSense::Eq,
        "one_hot",
    );
    s.objective_add(&coeffs(&[(0, 5.0), (1, 2.0), (2, 9.0)]), ObjDir::Minimize);
    assert_eq!(s.solve_ilp(), SolveStatus::Optimal);

    let mut out = HashMap::new();
    s.vars_solution(&mut out);
    assert_eq!(out[&1], 1.0);

    // and a third, infeasible one
    s.make(1);
    s.set_int(0);
    s.set_bnds(0, 0.0, f64::INFINITY);
    s.add_row(&coeffs(&[(0, 1.0)]), -1.0, RowSense::Le, "never");
    assert_eq!(s.solve_ilp(), SolveStatus::Infeasible);
}

#[test]
fn infeasible_and_failed_both_lack_solutions() {
    assert!(!SolveStatus::Infeasible.has_solution());
    assert!(!SolveStatus::Failed.has_solution());
    assert!(!SolveStatus::Unbounded.has_solution());
    assert!(SolveStatus::Optimal.has_solution());
    assert!(SolveStatus::Feasible.has_solution());
}
