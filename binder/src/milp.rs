// milp.rs — MILP solver abstraction
//
// Decouples binding algorithms that want an exact assignment from the
// numeric optimizer underneath. The trait models a 0/1-or-bounded-integer
// program: variables with bounds, sparse linear rows, one linear
// objective. One solver object serves a sequence of unrelated problems via
// `make`; each binding session owns a private solver.
//
// Preconditions: variable indices are zero-based and < the `make` count.
// Postconditions: a successful solve leaves a retrievable assignment;
//                 `make` erases all state from the previous problem.
// Failure modes: every failure is a `SolveStatus` variant — the abstraction
//                itself never aborts the caller.
// Side effects: none beyond internal solver state.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

/// Backends with name-length limits see row/column names clipped to this.
pub const MAX_SOLVER_NAME: usize = 64;

const EPS: f64 = 1e-6;

/// Deadline applied when the caller never set one.
const DEFAULT_MAX_SECONDS: f64 = 60.0;

/// Clip a row/column name for a backend, marking the cut with an ellipsis.
pub fn clip_name(name: &str) -> String {
    if name.chars().count() <= MAX_SOLVER_NAME {
        return name.to_string();
    }
    let mut clipped: String = name.chars().take(MAX_SOLVER_NAME - 1).collect();
    clipped.push('…');
    clipped
}

// ── Contract types ──────────────────────────────────────────────────────────

/// Comparison operator of a linear constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowSense {
    Le,
    Eq,
    Ge,
}

/// Optimization direction of the objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObjDir {
    #[default]
    Minimize,
    Maximize,
}

/// Outcome of a solve call, a small closed taxonomy.
///
/// Callers must treat `Infeasible` and `Failed` identically (fall back to
/// a heuristic) but are expected to log them differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// Proven optimal assignment available.
    Optimal,
    /// Feasible assignment available, optimality not proven (budget hit).
    Feasible,
    /// No assignment satisfies the constraints.
    Infeasible,
    /// The objective improves without limit.
    Unbounded,
    /// Solver error or time budget exceeded with no incumbent.
    Failed,
}

impl SolveStatus {
    /// True when a solution can be retrieved with `vars_solution`.
    pub fn has_solution(&self) -> bool {
        matches!(self, SolveStatus::Optimal | SolveStatus::Feasible)
    }
}

/// Backend-agnostic interface to a mixed-integer linear program.
pub trait MilpSolver {
    /// (Re)initialize with `n_vars` decision variables, each starting at
    /// the degenerate bound [0, 0]. Callable repeatedly on one object; no
    /// state leaks between problems.
    fn make(&mut self, n_vars: usize);

    /// Append one linear constraint. An empty coefficient map is a no-op,
    /// not an error — generically built constraints legitimately degenerate
    /// to empty.
    fn add_row(&mut self, coeffs: &BTreeMap<usize, f64>, rhs: f64, sense: RowSense, name: &str);

    /// Accumulate terms into the single linear objective and set its
    /// direction.
    fn objective_add(&mut self, coeffs: &BTreeMap<usize, f64>, dir: ObjDir);

    fn set_bnds(&mut self, var: usize, lo: f64, hi: f64);
    fn set_lowbo(&mut self, var: usize, lo: f64);
    fn set_upbo(&mut self, var: usize, hi: f64);
    fn set_int(&mut self, var: usize);

    /// Integer with bounds [0, 1].
    fn set_binary(&mut self, var: usize) {
        self.set_int(var);
        self.set_bnds(var, 0.0, 1.0);
    }

    /// Hard wall-clock budget for subsequent solves. Exceeding it surfaces
    /// as `SolveStatus::Failed`, never as a hang.
    fn set_max_seconds(&mut self, seconds: f64);

    /// Solve the linear relaxation.
    fn solve(&mut self) -> SolveStatus;

    /// Solve with integrality honored.
    fn solve_ilp(&mut self) -> SolveStatus;

    /// Copy the last solved assignment into `out` (var index → value).
    /// Stale or empty before the first successful solve.
    fn vars_solution(&self, out: &mut HashMap<usize, f64>);
}

// ── Solver selection ────────────────────────────────────────────────────────

/// Which concrete backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverKind {
    ExactSearch,
}

/// Per-session solver configuration.
#[derive(Debug, Clone, Copy)]
pub struct SolverConfig {
    pub kind: SolverKind,
    pub max_seconds: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            kind: SolverKind::ExactSearch,
            max_seconds: 5.0,
        }
    }
}

/// Construct a fresh solver. One per problem instance; never shared
/// across concurrently running binding passes.
pub fn create_solver(config: &SolverConfig) -> Box<dyn MilpSolver> {
    match config.kind {
        SolverKind::ExactSearch => {
            let mut solver = Box::new(ExactSearchSolver::new());
            solver.set_max_seconds(config.max_seconds);
            solver
        }
    }
}

// ── Reference backend ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct VarDom {
    lo: f64,
    hi: f64,
    integer: bool,
}

#[derive(Debug, Clone)]
struct Row {
    coeffs: Vec<(usize, f64)>,
    rhs: f64,
    sense: RowSense,
    name: String,
}

/// Bounds-propagation + depth-first enumeration over finite integer
/// domains, with activity-based pruning and the deadline honored at every
/// step. Solves the 0/1 and small bounded-integer programs the binding
/// engine produces; `solve` delegates to the same search because those
/// formulations are pure-integer. A dedicated LP backend can replace this
/// behind the trait without touching any caller.
#[derive(Debug, Default)]
pub struct ExactSearchSolver {
    vars: Vec<VarDom>,
    rows: Vec<Row>,
    objective: Vec<f64>,
    dir: ObjDir,
    max_seconds: f64,
    solution: Vec<f64>,
    has_solution: bool,
}

impl ExactSearchSolver {
    pub fn new() -> Self {
        Self {
            max_seconds: DEFAULT_MAX_SECONDS,
            ..Self::default()
        }
    }
}

impl MilpSolver for ExactSearchSolver {
    fn make(&mut self, n_vars: usize) {
        self.vars = vec![
            VarDom {
                lo: 0.0,
                hi: 0.0,
                integer: false,
            };
            n_vars
        ];
        self.rows.clear();
        self.objective = vec![0.0; n_vars];
        self.dir = ObjDir::Minimize;
        self.solution.clear();
        self.has_solution = false;
    }

    fn add_row(&mut self, coeffs: &BTreeMap<usize, f64>, rhs: f64, sense: RowSense, name: &str) {
        let coeffs: Vec<(usize, f64)> = coeffs
            .iter()
            .filter(|&(_, &c)| c != 0.0)
            .map(|(&v, &c)| (v, c))
            .collect();
        if coeffs.is_empty() {
            return;
        }
        self.rows.push(Row {
            coeffs,
            rhs,
            sense,
            name: clip_name(name),
        });
    }

    fn objective_add(&mut self, coeffs: &BTreeMap<usize, f64>, dir: ObjDir) {
        for (&v, &c) in coeffs {
            if v < self.objective.len() {
                self.objective[v] += c;
            }
        }
        self.dir = dir;
    }

    fn set_bnds(&mut self, var: usize, lo: f64, hi: f64) {
        if let Some(dom) = self.vars.get_mut(var) {
            dom.lo = lo;
            dom.hi = hi;
        }
    }

    fn set_lowbo(&mut self, var: usize, lo: f64) {
        if let Some(dom) = self.vars.get_mut(var) {
            dom.lo = lo;
        }
    }

    fn set_upbo(&mut self, var: usize, hi: f64) {
        if let Some(dom) = self.vars.get_mut(var) {
            dom.hi = hi;
        }
    }

    fn set_int(&mut self, var: usize) {
        if let Some(dom) = self.vars.get_mut(var) {
            dom.integer = true;
        }
    }

    fn set_max_seconds(&mut self, seconds: f64) {
        self.max_seconds = seconds;
    }

    fn solve(&mut self) -> SolveStatus {
        // the engine's formulations are pure-integer; the relaxation and
        // the integer problem coincide for this backend
        self.solve_ilp()
    }

    fn solve_ilp(&mut self) -> SolveStatus {
        let budget = if self.max_seconds > 0.0 {
            self.max_seconds
        } else {
            DEFAULT_MAX_SECONDS
        };
        let deadline = Instant::now() + Duration::from_secs_f64(budget);

        if let Some(status) = self.detect_unbounded() {
            return status;
        }

        let mut doms = self.vars.clone();
        if !propagate_bounds(&mut doms, &self.rows) {
            log::debug!("bounds propagation proved infeasibility");
            return SolveStatus::Infeasible;
        }

        // integer enumeration domains
        let mut domains: Vec<(i64, i64)> = Vec::with_capacity(doms.len());
        for (i, dom) in doms.iter().enumerate() {
            let in_rows = self.rows.iter().any(|r| row_mentions(r, i));
            if !in_rows {
                let c = self.objective[i];
                let v = if c == 0.0 {
                    // free variable: pin to any in-bounds value
                    pin_value(dom)
                } else {
                    // objective-only variable: its optimum sits at the
                    // improving bound, proved finite by the unbounded check
                    let up = match self.dir {
                        ObjDir::Maximize => c > 0.0,
                        ObjDir::Minimize => c < 0.0,
                    };
                    if up {
                        (dom.hi + EPS).floor() as i64
                    } else {
                        (dom.lo - EPS).ceil() as i64
                    }
                };
                domains.push((v, v));
                continue;
            }
            if !dom.lo.is_finite() || !dom.hi.is_finite() {
                log::warn!("variable {} has an infinite enumeration domain", i);
                return SolveStatus::Failed;
            }
            // continuous variables are in scope only when propagation has
            // pinned them to one integral value
            if !dom.integer
                && ((dom.hi - dom.lo).abs() > EPS || (dom.lo - dom.lo.round()).abs() > EPS)
            {
                log::warn!(
                    "continuous variable {} is not pinned to an integer; \
                     outside this backend's scope",
                    i
                );
                return SolveStatus::Failed;
            }
            let lo = (dom.lo - EPS).ceil() as i64;
            let hi = (dom.hi + EPS).floor() as i64;
            if lo > hi {
                return SolveStatus::Infeasible;
            }
            domains.push((lo, hi));
        }

        let mut search = Search {
            rows: &self.rows,
            objective: &self.objective,
            dir: self.dir,
            domains: &domains,
            order: search_order(&domains),
            assignment: vec![0; domains.len()],
            fixed: vec![false; domains.len()],
            incumbent: None,
            incumbent_cost: f64::INFINITY,
            deadline,
            nodes: 0,
            out_of_time: false,
        };
        search.dfs(0);

        log::trace!("search explored {} nodes", search.nodes);
        match (search.incumbent, search.out_of_time) {
            (Some(best), false) => {
                self.solution = best.iter().map(|&v| v as f64).collect();
                self.has_solution = true;
                SolveStatus::Optimal
            }
            (Some(best), true) => {
                self.solution = best.iter().map(|&v| v as f64).collect();
                self.has_solution = true;
                SolveStatus::Feasible
            }
            (None, false) => SolveStatus::Infeasible,
            (None, true) => {
                log::warn!(
                    "solver budget of {:.1}s exhausted with no incumbent",
                    budget
                );
                SolveStatus::Failed
            }
        }
    }

    fn vars_solution(&self, out: &mut HashMap<usize, f64>) {
        if !self.has_solution {
            return;
        }
        for (i, &v) in self.solution.iter().enumerate() {
            out.insert(i, v);
        }
    }
}

impl ExactSearchSolver {
    /// Conservative unboundedness test: an objective coefficient pointing
    /// at an infinite bound on a variable no row constrains.
    fn detect_unbounded(&self) -> Option<SolveStatus> {
        for (i, dom) in self.vars.iter().enumerate() {
            let c = self.objective[i];
            if c == 0.0 || self.rows.iter().any(|r| row_mentions(r, i)) {
                continue;
            }
            let improving_up = match self.dir {
                ObjDir::Maximize => c > 0.0,
                ObjDir::Minimize => c < 0.0,
            };
            let open = if improving_up {
                dom.hi == f64::INFINITY
            } else {
                dom.lo == f64::NEG_INFINITY
            };
            if open {
                return Some(SolveStatus::Unbounded);
            }
        }
        None
    }
}

fn row_mentions(row: &Row, var: usize) -> bool {
    row.coeffs.iter().any(|&(v, _)| v == var)
}

fn pin_value(dom: &VarDom) -> i64 {
    if dom.lo.is_finite() {
        (dom.lo - EPS).ceil() as i64
    } else if dom.hi.is_finite() {
        (dom.hi + EPS).floor() as i64
    } else {
        0
    }
}

/// Tighten variable bounds from single-variable rows and check activity
/// bounds of every row. Returns false on proven infeasibility.
fn propagate_bounds(doms: &mut [VarDom], rows: &[Row]) -> bool {
    for _sweep in 0..8 {
        let mut changed = false;
        for row in rows {
            if let [(v, c)] = row.coeffs[..] {
                let dom = &mut doms[v];
                let bound = row.rhs / c;
                // c*x ≤ rhs tightens hi when c>0, lo when c<0; Ge mirrors
                let (tighten_hi, tighten_lo) = match (row.sense, c > 0.0) {
                    (RowSense::Le, true) | (RowSense::Ge, false) => (true, false),
                    (RowSense::Le, false) | (RowSense::Ge, true) => (false, true),
                    (RowSense::Eq, _) => (true, true),
                };
                if tighten_hi && bound < dom.hi - EPS {
                    dom.hi = bound;
                    changed = true;
                }
                if tighten_lo && bound > dom.lo + EPS {
                    dom.lo = bound;
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }

    for dom in doms.iter() {
        if dom.lo > dom.hi + EPS {
            return false;
        }
    }
    for row in rows {
        let (min_act, max_act) = activity_bounds(row, doms);
        let feasible = match row.sense {
            RowSense::Le => min_act <= row.rhs + EPS,
            RowSense::Ge => max_act >= row.rhs - EPS,
            RowSense::Eq => min_act <= row.rhs + EPS && max_act >= row.rhs - EPS,
        };
        if !feasible {
            log::trace!("row '{}' cannot be satisfied within bounds", row.name);
            return false;
        }
    }
    true
}

fn activity_bounds(row: &Row, doms: &[VarDom]) -> (f64, f64) {
    let mut min_act = 0.0;
    let mut max_act = 0.0;
    for &(v, c) in &row.coeffs {
        let dom = &doms[v];
        let (a, b) = (c * dom.lo, c * dom.hi);
        min_act += a.min(b);
        max_act += a.max(b);
    }
    (min_act, max_act)
}

/// Smallest domains first; ties broken by index for determinism.
fn search_order(domains: &[(i64, i64)]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..domains.len()).collect();
    order.sort_by_key(|&i| (domains[i].1 - domains[i].0, i as i64));
    order
}

struct Search<'a> {
    rows: &'a [Row],
    objective: &'a [f64],
    dir: ObjDir,
    domains: &'a [(i64, i64)],
    order: Vec<usize>,
    assignment: Vec<i64>,
    fixed: Vec<bool>,
    incumbent: Option<Vec<i64>>,
    incumbent_cost: f64,
    deadline: Instant,
    nodes: u64,
    out_of_time: bool,
}

impl Search<'_> {
    fn dfs(&mut self, depth: usize) {
        if self.out_of_time {
            return;
        }
        self.nodes += 1;
        if Instant::now() >= self.deadline {
            self.out_of_time = true;
            return;
        }

        if depth == self.order.len() {
            let cost = self.minimized_cost();
            if cost < self.incumbent_cost - EPS {
                self.incumbent_cost = cost;
                self.incumbent = Some(self.assignment.clone());
            }
            return;
        }

        let var = self.order[depth];
        let (lo, hi) = self.domains[var];
        for value in lo..=hi {
            self.assignment[var] = value;
            self.fixed[var] = true;
            if self.rows_satisfiable() && self.can_beat_incumbent() {
                self.dfs(depth + 1);
            }
            self.fixed[var] = false;
            if self.out_of_time {
                return;
            }
        }
    }

    /// Objective normalized to a minimization cost.
    fn minimized_cost(&self) -> f64 {
        let raw: f64 = self
            .assignment
            .iter()
            .zip(self.objective)
            .map(|(&v, &c)| v as f64 * c)
            .sum();
        match self.dir {
            ObjDir::Minimize => raw,
            ObjDir::Maximize => -raw,
        }
    }

    /// Every row must still admit a completion given fixed + free bounds.
    fn rows_satisfiable(&self) -> bool {
        for row in self.rows {
            let mut min_act = 0.0;
            let mut max_act = 0.0;
            for &(v, c) in &row.coeffs {
                if self.fixed[v] {
                    let a = c * self.assignment[v] as f64;
                    min_act += a;
                    max_act += a;
                } else {
                    let (lo, hi) = self.domains[v];
                    let (a, b) = (c * lo as f64, c * hi as f64);
                    min_act += a.min(b);
                    max_act += a.max(b);
                }
            }
            let ok = match row.sense {
                RowSense::Le => min_act <= row.rhs + EPS,
                RowSense::Ge => max_act >= row.rhs - EPS,
                RowSense::Eq => min_act <= row.rhs + EPS && max_act >= row.rhs - EPS,
            };
            if !ok {
                return false;
            }
        }
        true
    }

    /// Optimistic cost of any completion must beat the incumbent.
    fn can_beat_incumbent(&self) -> bool {
        if self.incumbent.is_none() {
            return true;
        }
        let mut optimistic = 0.0;
        for (v, &c) in self.objective.iter().enumerate() {
            if c == 0.0 {
                continue;
            }
            let signed = |x: i64| match self.dir {
                ObjDir::Minimize => c * x as f64,
                ObjDir::Maximize => -c * x as f64,
            };
            if self.fixed[v] {
                optimistic += signed(self.assignment[v]);
            } else {
                let (lo, hi) = self.domains[v];
                optimistic += signed(lo).min(signed(hi));
            }
        }
        optimistic < self.incumbent_cost - EPS
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
