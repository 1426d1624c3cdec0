// dot.rs — Graphviz DOT output for the storage affinity graph
//
// Renders storage values as nodes and compatibility weights as undirected
// edges, suitable for `dot`/`neato`. Useful when inspecting why the
// register allocator merged (or refused to merge) two values.
//
// Preconditions: `storage` and `model` come from the same session.
// Postconditions: returns a valid DOT string with deterministic ordering.
// Failure modes: none (pure string formatting).
// Side effects: none.

use std::fmt::Write;

use crate::storage::{CompatibilityModel, StorageSet};

/// Emit the affinity graph as a Graphviz `graph` (undirected). Edges with
/// weight below `min_weight` are omitted to keep large graphs readable.
pub fn emit_affinity_dot(
    storage: &StorageSet,
    model: &CompatibilityModel<'_>,
    min_weight: u32,
) -> String {
    let mut buf = String::new();
    writeln!(buf, "graph affinity {{").unwrap();
    writeln!(buf, "    node [shape=ellipse, fontname=\"Helvetica\", fontsize=10];").unwrap();
    writeln!(buf, "    edge [fontname=\"Helvetica\", fontsize=9];").unwrap();

    for sv in storage.iter() {
        writeln!(
            buf,
            "    sv{} [label=\"v{} ({}b)\"];",
            sv.id.0, sv.variable.0, sv.bit_width
        )
        .unwrap();
    }

    // unordered pairs in storage order: weights are symmetric
    let values: Vec<_> = storage.iter().collect();
    for (i, a) in values.iter().enumerate() {
        for b in &values[i + 1..] {
            let w = model.get_compatibility_weight(a.id, b.id);
            if w < min_weight {
                continue;
            }
            writeln!(
                buf,
                "    sv{} -- sv{} [label=\"{}\", penwidth={:.1}];",
                a.id.0,
                b.id.0,
                w,
                w as f64 / 2.0
            )
            .unwrap();
        }
    }

    writeln!(buf, "}}").unwrap();
    buf
}

// ── Tests ───────────────────────────────────────────────────────────────────
