// driver.rs — Binding session orchestration
//
// Holds one function's binding state (graph, schedule, catalog, binding,
// storage set, optional structural netlist) and runs the stages declared
// in pass.rs. A session either binds fresh or restores a previously
// persisted document; each session owns a private solver configuration so
// concurrently bound functions share no mutable state.
//
// Preconditions: the graph and schedule describe the same function.
// Postconditions: after `run`, either `document` holds the persisted form
//                 or `has_error` is set with diagnostics explaining why.
// Failure modes: any stage emitting error-level diagnostics stops the run.
// Side effects: none outside the session.

use crate::assign::{assign_instances, select_fu_types};
use crate::binding::{verify_binding, BindCert, FuBinding};
use crate::catalog::AllocationCatalog;
use crate::diag::{has_errors, Diagnostic};
use crate::graph::OperationGraph;
use crate::milp::SolverConfig;
use crate::netlist::StructuralNetlist;
use crate::pass::{descriptor, required_stages, StageId};
use crate::persist::{load, save, save_with_report, BindingDoc};
use crate::proxy::{resolve_function_proxies, resolve_memory_proxies, verify_proxies, ProxyCert};
use crate::schedule::Schedule;
use crate::storage::{build_storage_values, CompatibilityModel, StorageSet};

/// Per-session configuration. The solver budget applies to every exact
/// assignment attempted within the session.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionConfig {
    pub solver: SolverConfig,
}

/// One function's binding pass, from scheduled graph to persisted document.
pub struct BindingSession {
    pub graph: OperationGraph,
    pub schedule: Schedule,
    pub catalog: AllocationCatalog,
    pub binding: FuBinding,
    pub storage: Option<StorageSet>,
    pub netlist: Option<StructuralNetlist>,
    pub document: Option<BindingDoc>,
    pub diagnostics: Vec<Diagnostic>,
    pub has_error: bool,
    config: SessionConfig,
}

impl BindingSession {
    /// A fresh session: binding will be computed from scratch.
    pub fn new(
        graph: OperationGraph,
        schedule: Schedule,
        catalog: AllocationCatalog,
        config: SessionConfig,
    ) -> Self {
        Self {
            graph,
            schedule,
            catalog,
            binding: FuBinding::new(),
            storage: None,
            netlist: None,
            document: None,
            diagnostics: Vec::new(),
            has_error: false,
            config,
        }
    }

    /// Restore a session from a previously persisted document instead of
    /// invoking the binding logic.
    pub fn from_document(
        graph: OperationGraph,
        mut catalog: AllocationCatalog,
        doc: &BindingDoc,
        config: SessionConfig,
    ) -> Self {
        let loaded = load(doc, &graph, &mut catalog);
        let has_error = has_errors(&loaded.diagnostics);
        Self {
            graph,
            schedule: loaded.schedule,
            catalog,
            binding: loaded.binding,
            storage: None,
            netlist: None,
            document: Some(doc.clone()),
            diagnostics: loaded.diagnostics,
            has_error,
            config,
        }
    }

    /// Attach the structural hierarchy consumed by proxy resolution and
    /// the resource report.
    pub fn with_netlist(mut self, netlist: StructuralNetlist) -> Self {
        self.netlist = Some(netlist);
        self
    }

    /// Run every stage through persistence.
    pub fn run(&mut self) {
        self.run_to(StageId::Persist);
        // storage values feed the external register allocator; they are
        // not on the persistence path, so build them explicitly
        if !self.has_error && self.storage.is_none() {
            self.run_stage(StageId::BuildStorage);
        }
    }

    /// Run the minimal stage set for `terminal`, stopping at the first
    /// stage that produces error diagnostics.
    pub fn run_to(&mut self, terminal: StageId) {
        for stage in required_stages(terminal) {
            if self.has_error {
                log::debug!("skipping stage '{}' after errors", descriptor(stage).name);
                return;
            }
            self.run_stage(stage);
        }
    }

    /// The stages a loaded session still needs: storage values and proxy
    /// resolution (the binding itself came from the document).
    pub fn run_loaded(&mut self) {
        if !self.has_error {
            self.run_stage(StageId::BuildStorage);
        }
        if !self.has_error {
            self.run_stage(StageId::ResolveProxies);
        }
    }

    pub fn run_stage(&mut self, stage: StageId) {
        log::debug!("running stage '{}'", descriptor(stage).name);
        match stage {
            StageId::BuildStorage => {
                self.storage = Some(build_storage_values(&self.graph));
            }
            StageId::BindFus => {
                let diags = select_fu_types(&self.graph, &self.catalog, &mut self.binding);
                self.absorb(diags);
                if self.has_error {
                    return;
                }
                let result = assign_instances(
                    &self.graph,
                    &self.schedule,
                    &self.catalog,
                    &mut self.binding,
                    &self.config.solver,
                );
                self.absorb(result.diagnostics);
            }
            StageId::ResolveProxies => {
                let Some(netlist) = self.netlist.as_mut() else {
                    log::debug!("no structural netlist attached; nothing to resolve");
                    return;
                };
                let mem = resolve_memory_proxies(netlist);
                self.absorb(mem.diagnostics);
                if self.has_error {
                    return;
                }
                let Some(netlist) = self.netlist.as_mut() else {
                    return;
                };
                let fun = resolve_function_proxies(netlist);
                self.absorb(fun.diagnostics);
            }
            StageId::Persist => {
                let doc = match &self.netlist {
                    Some(netlist) => save_with_report(
                        &self.graph,
                        &self.schedule,
                        &self.binding,
                        &self.catalog,
                        netlist,
                    ),
                    None => save(&self.graph, &self.schedule, &self.binding, &self.catalog),
                };
                self.document = Some(doc);
            }
        }
    }

    /// The compatibility model over this session's current binding.
    /// `None` until storage values have been built.
    pub fn compatibility(&self) -> Option<CompatibilityModel<'_>> {
        self.storage
            .as_ref()
            .map(|storage| CompatibilityModel::new(&self.graph, &self.binding, storage))
    }

    /// Conformance cert for the current binding.
    pub fn bind_cert(&self) -> BindCert {
        verify_binding(&self.binding, &self.schedule, &self.catalog)
    }

    /// Conformance cert for the attached netlist, if any.
    pub fn proxy_cert(&self) -> Option<ProxyCert> {
        self.netlist.as_ref().map(verify_proxies)
    }

    fn absorb(&mut self, diags: Vec<Diagnostic>) {
        if has_errors(&diags) {
            self.has_error = true;
        }
        self.diagnostics.extend(diags);
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
