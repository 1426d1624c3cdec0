// graph.rs — Scheduled operation dataflow graph
//
// The in-memory representation of one function's operation graph as handed
// over by the control-step scheduler. Operations define and use scalar
// values (SSA-like: every value has at most one defining operation);
// def/use sets induce the dataflow edges.
//
// Preconditions: the external scheduler has produced operations with
//                unique names and single-definition values.
// Postconditions: all indices (by name, by defined value, by reader) stay
//                 consistent with the operation set.
// Failure modes: duplicate names or second definitions are rejected at
//                insertion with a `GraphError`.
// Side effects: none.

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;

use crate::id::{OpId, ValueId};

/// Bit width assumed for values the scheduler did not annotate.
pub const DEFAULT_BIT_WIDTH: u32 = 32;

// ── Operation kind ──────────────────────────────────────────────────────────

/// The kind of a scheduled operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// φ-like merge of several reaching definitions.
    Merge,
    Add,
    Sub,
    Mul,
    Div,
    /// Memory read through a shared port.
    Load,
    /// Memory write through a shared port.
    Store,
    /// Invocation of a sub-function module.
    Call { callee: String },
    /// Structural glue (copies, port assigns); artificial, never bound.
    Assign,
    Other { name: String },
}

impl OpKind {
    /// Artificial operations are structural glue with no functional unit.
    pub fn is_artificial(&self) -> bool {
        matches!(self, OpKind::Assign)
    }

    pub fn is_merge(&self) -> bool {
        matches!(self, OpKind::Merge)
    }

    pub fn is_mul(&self) -> bool {
        matches!(self, OpKind::Mul)
    }

    /// Stable key used to look up FU candidates in the allocation catalog.
    pub fn key(&self) -> String {
        match self {
            OpKind::Merge => "merge".to_string(),
            OpKind::Add => "add".to_string(),
            OpKind::Sub => "sub".to_string(),
            OpKind::Mul => "mul".to_string(),
            OpKind::Div => "div".to_string(),
            OpKind::Load => "load".to_string(),
            OpKind::Store => "store".to_string(),
            OpKind::Call { callee } => format!("call:{callee}"),
            OpKind::Assign => "assign".to_string(),
            OpKind::Other { name } => name.clone(),
        }
    }
}

// ── Operation ───────────────────────────────────────────────────────────────

/// A node in the scheduled dataflow graph.
#[derive(Debug, Clone)]
pub struct Operation {
    pub id: OpId,
    /// Unique name, the persistence key (`vertex_name`).
    pub name: String,
    pub kind: OpKind,
    /// Values this operation defines (at most one definer per value).
    pub defs: Vec<ValueId>,
    /// Values this operation reads.
    pub uses: Vec<ValueId>,
}

// ── Graph error ─────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum GraphError {
    DuplicateName { name: String },
    SecondDefinition { value: ValueId, first: OpId, second: OpId },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::DuplicateName { name } => {
                write!(f, "duplicate operation name '{}'", name)
            }
            GraphError::SecondDefinition {
                value,
                first,
                second,
            } => {
                write!(
                    f,
                    "value v{} defined twice: by op {} and op {}",
                    value.0, first.0, second.0
                )
            }
        }
    }
}

impl std::error::Error for GraphError {}

// ── Operation graph ─────────────────────────────────────────────────────────

/// One function's scheduled operation graph with derived indices.
#[derive(Debug, Default)]
pub struct OperationGraph {
    ops: IndexMap<OpId, Operation>,
    name_index: HashMap<String, OpId>,
    def_index: HashMap<ValueId, OpId>,
    reader_index: HashMap<ValueId, Vec<OpId>>,
    value_widths: HashMap<ValueId, u32>,
}

impl OperationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an operation and update all indices.
    pub fn insert(&mut self, op: Operation) -> Result<(), GraphError> {
        if self.name_index.contains_key(&op.name) {
            return Err(GraphError::DuplicateName {
                name: op.name.clone(),
            });
        }
        for &v in &op.defs {
            if let Some(&first) = self.def_index.get(&v) {
                return Err(GraphError::SecondDefinition {
                    value: v,
                    first,
                    second: op.id,
                });
            }
        }

        self.name_index.insert(op.name.clone(), op.id);
        for &v in &op.defs {
            self.def_index.insert(v, op.id);
        }
        for &v in &op.uses {
            self.reader_index.entry(v).or_default().push(op.id);
        }
        self.ops.insert(op.id, op);
        Ok(())
    }

    /// Annotate a value's bit width (defaults to `DEFAULT_BIT_WIDTH`).
    pub fn set_value_width(&mut self, value: ValueId, bits: u32) {
        self.value_widths.insert(value, bits);
    }

    pub fn value_width(&self, value: ValueId) -> u32 {
        self.value_widths
            .get(&value)
            .copied()
            .unwrap_or(DEFAULT_BIT_WIDTH)
    }

    pub fn op(&self, id: OpId) -> Option<&Operation> {
        self.ops.get(&id)
    }

    pub fn op_by_name(&self, name: &str) -> Option<OpId> {
        self.name_index.get(name).copied()
    }

    /// The unique operation defining `value`, if any.
    pub fn defining_op(&self, value: ValueId) -> Option<OpId> {
        self.def_index.get(&value).copied()
    }

    /// Operations reading `value`, in insertion order.
    pub fn readers_of(&self, value: ValueId) -> &[OpId] {
        self.reader_index
            .get(&value)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Operations reading any value defined by `op`, deduplicated, in
    /// insertion order.
    pub fn direct_successors(&self, op: OpId) -> Vec<OpId> {
        let mut out = Vec::new();
        let Some(operation) = self.ops.get(&op) else {
            return out;
        };
        for &v in &operation.defs {
            for &reader in self.readers_of(v) {
                if !out.contains(&reader) {
                    out.push(reader);
                }
            }
        }
        out
    }

    /// All operations in insertion order.
    pub fn ops(&self) -> impl Iterator<Item = &Operation> {
        self.ops.values()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
