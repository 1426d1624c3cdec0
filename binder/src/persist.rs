// persist.rs — Binding persistence and resource reporting
//
// Round-trips the (schedule, FU binding) pair to a structured document:
// one `scheduling` record per bound operation and a `resource_allocation`
// summary tallied from the structural hierarchy. The persisted form is a
// multiset of per-operation records — loading is order-independent, and
// saving sorts by operation name purely for reproducible bytes.
//
// Preconditions: `graph` is the graph the binding refers to.
// Postconditions: save ∘ load is the identity on the Operation → FU map
//                 and on per-operation control steps.
// Failure modes: records naming unknown operations (`E0400`) or
//                contradicting each other (`E0401`) are error diagnostics;
//                malformed JSON is a `PersistError`.
// Side effects: `load` interns previously unseen FU types in the catalog.

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::binding::{FuBinding, FuInstance};
use crate::catalog::{AllocationCatalog, FuType, DEFAULT_LIBRARY, PROXY_LIBRARY, WORK_LIBRARY};
use crate::diag::{codes, DiagLevel, Diagnostic};
use crate::graph::OperationGraph;
use crate::netlist::StructuralNetlist;
use crate::schedule::Schedule;

/// Sentinel meaning "not a shared/indexed instance" in persisted records.
pub const UNBOUND_INDEX: i64 = -1;

fn default_library() -> String {
    DEFAULT_LIBRARY.to_string()
}

fn is_default_library(library: &String) -> bool {
    library == DEFAULT_LIBRARY
}

// ── Document types ──────────────────────────────────────────────────────────

/// One persisted binding constraint: operation name, control step, and the
/// FU instance executing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingRecord {
    pub vertex_name: String,
    pub cstep: u32,
    pub fu_name: String,
    pub fu_index: i64,
    #[serde(default = "default_library", skip_serializing_if = "is_default_library")]
    pub library: String,
}

/// One line of the resource summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub name: String,
    pub number: u32,
}

/// The persisted form of one function's binding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BindingDoc {
    pub scheduling: Vec<BindingRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_allocation: Vec<ResourceEntry>,
}

// ── Persist error ───────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum PersistError {
    DecodeError { message: String },
}

impl fmt::Display for PersistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistError::DecodeError { message } => {
                write!(f, "malformed binding document: {}", message)
            }
        }
    }
}

impl std::error::Error for PersistError {}

// ── Save ────────────────────────────────────────────────────────────────────

/// Serialize the bound, scheduled operations. Records are sorted by
/// operation name so identical bindings produce identical bytes.
pub fn save(
    graph: &OperationGraph,
    schedule: &Schedule,
    binding: &FuBinding,
    catalog: &AllocationCatalog,
) -> BindingDoc {
    let mut records = Vec::new();
    for (op, fu, inst) in binding.bound_ops() {
        let Some(operation) = graph.op(op) else {
            continue;
        };
        let Some(step) = schedule.get_cstep(op) else {
            log::debug!("operation '{}' is bound but unscheduled; not persisted", operation.name);
            continue;
        };
        let Some(fu_type) = catalog.fu_type(fu) else {
            continue;
        };
        records.push(BindingRecord {
            vertex_name: operation.name.clone(),
            cstep: step,
            fu_name: fu_type.name.clone(),
            fu_index: match inst {
                FuInstance::Unbound => UNBOUND_INDEX,
                FuInstance::Index(i) => i as i64,
            },
            library: fu_type.library.clone(),
        });
    }
    records.sort_by(|a, b| a.vertex_name.cmp(&b.vertex_name));

    BindingDoc {
        scheduling: records,
        resource_allocation: Vec::new(),
    }
}

/// Save plus the resource summary tallied from the structural hierarchy.
pub fn save_with_report(
    graph: &OperationGraph,
    schedule: &Schedule,
    binding: &FuBinding,
    catalog: &AllocationCatalog,
    netlist: &StructuralNetlist,
) -> BindingDoc {
    let mut doc = save(graph, schedule, binding, catalog);
    doc.resource_allocation = resource_usage(netlist, catalog)
        .into_iter()
        .map(|(name, number)| ResourceEntry { name, number })
        .collect();
    doc
}

// ── Load ────────────────────────────────────────────────────────────────────

/// Result of loading a persisted binding document.
#[derive(Debug)]
pub struct LoadResult {
    pub schedule: Schedule,
    pub binding: FuBinding,
    pub diagnostics: Vec<Diagnostic>,
}

/// Rebuild (schedule, binding) from a document. Iteration order over the
/// records carries no meaning. Unknown FU types auto-register in the
/// catalog; unknown operation names are fatal for the enclosing pass.
pub fn load(
    doc: &BindingDoc,
    graph: &OperationGraph,
    catalog: &mut AllocationCatalog,
) -> LoadResult {
    let mut schedule = Schedule::new();
    let mut binding = FuBinding::new();
    let mut diagnostics = Vec::new();
    let mut seen: HashMap<&str, &BindingRecord> = HashMap::new();

    for record in &doc.scheduling {
        let Some(op) = graph.op_by_name(&record.vertex_name) else {
            diagnostics.push(
                Diagnostic::new(
                    DiagLevel::Error,
                    format!(
                        "binding record names operation '{}' which is absent \
                         from the current graph",
                        record.vertex_name
                    ),
                )
                .with_code(codes::E0400)
                .with_subject(record.vertex_name.clone()),
            );
            continue;
        };

        match seen.get(record.vertex_name.as_str()) {
            Some(prior) if *prior != record => {
                diagnostics.push(
                    Diagnostic::new(
                        DiagLevel::Error,
                        format!(
                            "two binding records for operation '{}' disagree",
                            record.vertex_name
                        ),
                    )
                    .with_code(codes::E0401)
                    .with_subject(record.vertex_name.clone()),
                );
                continue;
            }
            Some(_) => continue, // identical duplicate in the multiset
            None => {
                seen.insert(record.vertex_name.as_str(), record);
            }
        }

        let fu = catalog.intern(FuType::new(&record.fu_name, &record.library));
        schedule.set_execution(op, record.cstep);
        let instance = if record.fu_index == UNBOUND_INDEX {
            FuInstance::Unbound
        } else {
            FuInstance::Index(record.fu_index as u32)
        };
        binding.bind(op, fu, instance);
    }

    LoadResult {
        schedule,
        binding,
        diagnostics,
    }
}

// ── JSON round-trip ─────────────────────────────────────────────────────────

pub fn to_json(doc: &BindingDoc) -> String {
    serde_json::to_string_pretty(doc).expect("binding documents always serialize")
}

pub fn from_json(text: &str) -> Result<BindingDoc, PersistError> {
    serde_json::from_str(text).map_err(|e| PersistError::DecodeError {
        message: e.to_string(),
    })
}

// ── Fingerprint ─────────────────────────────────────────────────────────────

/// SHA-256 over the canonical compact JSON of the document. Record order
/// does not change the fingerprint; any field change does.
pub fn fingerprint(doc: &BindingDoc) -> [u8; 32] {
    let mut canonical = doc.clone();
    canonical.scheduling.sort_by(|a, b| {
        (&a.vertex_name, a.cstep, &a.fu_name, a.fu_index, &a.library).cmp(&(
            &b.vertex_name,
            b.cstep,
            &b.fu_name,
            b.fu_index,
            &b.library,
        ))
    });
    canonical.resource_allocation.sort_by(|a, b| a.name.cmp(&b.name));

    let compact = serde_json::to_string(&canonical).expect("binding documents always serialize");
    let mut hasher = Sha256::new();
    hasher.update(compact.as_bytes());
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Hex string of the fingerprint (64 characters).
pub fn fingerprint_hex(doc: &BindingDoc) -> String {
    let mut s = String::with_capacity(64);
    for b in fingerprint(doc) {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
    }
    s
}

// ── Resource usage ──────────────────────────────────────────────────────────

/// Tally instantiated component types across the hierarchy, skipping
/// structural wrappers (`work`) and placeholder proxies (`PROXY`), and
/// expanding IP composition metadata transitively.
pub fn resource_usage(
    netlist: &StructuralNetlist,
    catalog: &AllocationCatalog,
) -> IndexMap<String, u32> {
    let mut usage: IndexMap<String, u32> = IndexMap::new();

    for module in netlist.modules() {
        if module.library == WORK_LIBRARY || module.library == PROXY_LIBRARY {
            continue;
        }
        count_component(&module.type_name, catalog, &mut usage, &mut Vec::new());
    }

    usage.sort_keys();
    usage
}

fn count_component(
    type_name: &str,
    catalog: &AllocationCatalog,
    usage: &mut IndexMap<String, u32>,
    in_progress: &mut Vec<String>,
) {
    *usage.entry(type_name.to_string()).or_insert(0) += 1;

    // composition metadata names nested component types
    if in_progress.iter().any(|n| n == type_name) {
        return; // malformed self-referential metadata; count once
    }
    let Some(id) = catalog.id_of(&FuType::std(type_name)) else {
        return;
    };
    let Some(spec) = catalog.spec(id) else {
        return;
    };
    in_progress.push(type_name.to_string());
    for nested in spec.composition.clone() {
        count_component(&nested, catalog, usage, in_progress);
    }
    in_progress.pop();
}

// ── Tests ───────────────────────────────────────────────────────────────────
