// catalog.rs — Allocation catalog
//
// The external allocation phase's answer to "what hardware can execute
// what": per-operation-kind candidate FU types, per-type instance pools,
// and area/latency costs. The binding stages treat this as read-mostly
// input; the only mutation they perform is interning FU types seen for the
// first time (auto-registration with a pool of one).

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::graph::Operation;

/// Library assumed for FU types persisted without an explicit one.
pub const DEFAULT_LIBRARY: &str = "STD";

/// Library holding placeholder proxy components; excluded from resource
/// reports and from FU candidacy.
pub const PROXY_LIBRARY: &str = "PROXY";

/// Library holding generated structural/control wrappers; excluded from
/// resource reports.
pub const WORK_LIBRARY: &str = "work";

// ── FU type ─────────────────────────────────────────────────────────────────

/// A class of hardware resource, identified by name + owning library.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FuType {
    pub name: String,
    pub library: String,
}

impl FuType {
    pub fn new(name: impl Into<String>, library: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            library: library.into(),
        }
    }

    /// An FU type in the default library.
    pub fn std(name: impl Into<String>) -> Self {
        Self::new(name, DEFAULT_LIBRARY)
    }
}

impl fmt::Display for FuType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.library, self.name)
    }
}

/// Catalog-interned handle for an FU type (index into the catalog table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuTypeId(pub u32);

/// Per-type allocation data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuSpec {
    /// Size of the shared instance pool for this type.
    pub allocation: u32,
    /// Relative area cost of one instance.
    pub area: f64,
    /// Control steps one operation occupies the unit (≥ 1).
    pub latency: u32,
    /// Component types instantiated inside this one (IP composition
    /// metadata), counted transitively by the resource report.
    pub composition: Vec<String>,
}

impl Default for FuSpec {
    fn default() -> Self {
        Self {
            allocation: 1,
            area: 1.0,
            latency: 1,
            composition: Vec::new(),
        }
    }
}

// ── Catalog error ───────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum CatalogError {
    DuplicateType { fu: FuType },
    IoError { path: PathBuf, source: std::io::Error },
    DecodeError { message: String },
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::DuplicateType { fu } => {
                write!(f, "FU type '{}' registered twice", fu)
            }
            CatalogError::IoError { path, source } => {
                write!(f, "{}: {}", path.display(), source)
            }
            CatalogError::DecodeError { message } => {
                write!(f, "malformed catalog: {}", message)
            }
        }
    }
}

impl std::error::Error for CatalogError {}

// ── Catalog ─────────────────────────────────────────────────────────────────

/// The allocation catalog for one binding session.
#[derive(Debug, Default)]
pub struct AllocationCatalog {
    types: IndexMap<FuType, FuSpec>,
    /// Candidate FU types per operation-kind key (`OpKind::key()`).
    candidates: HashMap<String, Vec<FuTypeId>>,
}

impl AllocationCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an FU type with an explicit spec. Duplicate registration is
    /// a configuration error.
    pub fn register(&mut self, fu: FuType, spec: FuSpec) -> Result<FuTypeId, CatalogError> {
        if self.types.contains_key(&fu) {
            return Err(CatalogError::DuplicateType { fu });
        }
        let id = FuTypeId(self.types.len() as u32);
        self.types.insert(fu, spec);
        Ok(id)
    }

    /// Intern an FU type, auto-registering it with a default spec
    /// (pool of one) when unseen. Never fails.
    pub fn intern(&mut self, fu: FuType) -> FuTypeId {
        if let Some(idx) = self.types.get_index_of(&fu) {
            return FuTypeId(idx as u32);
        }
        let id = FuTypeId(self.types.len() as u32);
        self.types.insert(fu, FuSpec::default());
        id
    }

    pub fn id_of(&self, fu: &FuType) -> Option<FuTypeId> {
        self.types.get_index_of(fu).map(|i| FuTypeId(i as u32))
    }

    pub fn fu_type(&self, id: FuTypeId) -> Option<&FuType> {
        self.types.get_index(id.0 as usize).map(|(fu, _)| fu)
    }

    pub fn spec(&self, id: FuTypeId) -> Option<&FuSpec> {
        self.types.get_index(id.0 as usize).map(|(_, spec)| spec)
    }

    pub fn spec_mut(&mut self, id: FuTypeId) -> Option<&mut FuSpec> {
        self.types.get_index_mut(id.0 as usize).map(|(_, spec)| spec)
    }

    /// Declare `fu` a candidate executor for operations whose kind key is
    /// `kind_key`. Order of declaration is the preference tie-break order.
    pub fn add_candidate(&mut self, kind_key: impl Into<String>, fu: FuTypeId) {
        self.candidates.entry(kind_key.into()).or_default().push(fu);
    }

    /// Candidate FU types for an operation, in declaration order. Empty for
    /// kinds nothing was declared for (artificial operations in particular).
    pub fn candidates_for(&self, op: &Operation) -> &[FuTypeId] {
        self.candidates
            .get(&op.kind.key())
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn types(&self) -> impl Iterator<Item = (FuTypeId, &FuType, &FuSpec)> {
        self.types
            .iter()
            .enumerate()
            .map(|(i, (fu, spec))| (FuTypeId(i as u32), fu, spec))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Build a catalog from deserialized entries. Duplicate FU types are a
    /// configuration error.
    pub fn from_entries(entries: Vec<CatalogEntry>) -> Result<Self, CatalogError> {
        let mut cat = Self::new();
        for entry in entries {
            let fu = FuType::new(entry.name, entry.library);
            let id = cat.register(
                fu,
                FuSpec {
                    allocation: entry.allocation,
                    area: entry.area,
                    latency: entry.latency,
                    composition: entry.composition,
                },
            )?;
            for kind in entry.kinds {
                cat.add_candidate(kind, id);
            }
        }
        Ok(cat)
    }

    /// Decode a catalog from its JSON form (a list of entries).
    pub fn from_json(text: &str) -> Result<Self, CatalogError> {
        let entries: Vec<CatalogEntry> =
            serde_json::from_str(text).map_err(|e| CatalogError::DecodeError {
                message: e.to_string(),
            })?;
        Self::from_entries(entries)
    }

    /// Load a catalog from a JSON file on disk.
    pub fn load_file(path: &std::path::Path) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path).map_err(|e| CatalogError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&text)
    }
}

// ── Catalog file form ───────────────────────────────────────────────────────

fn default_library_name() -> String {
    DEFAULT_LIBRARY.to_string()
}

fn default_pool() -> u32 {
    1
}

fn default_area() -> f64 {
    1.0
}

fn default_latency() -> u32 {
    1
}

/// One FU type as it appears in a catalog file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    #[serde(default = "default_library_name")]
    pub library: String,
    #[serde(default = "default_pool")]
    pub allocation: u32,
    #[serde(default = "default_area")]
    pub area: f64,
    #[serde(default = "default_latency")]
    pub latency: u32,
    #[serde(default)]
    pub composition: Vec<String>,
    /// Operation-kind keys this type can execute.
    #[serde(default)]
    pub kinds: Vec<String>,
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::OpKind;
    use crate::id::OpId;

    fn mul_op() -> Operation {
        Operation {
            id: OpId(0),
            name: "m".to_string(),
            kind: OpKind::Mul,
            defs: vec![],
            uses: vec![],
        }
    }

    #[test]
    fn register_and_lookup() {
        let mut cat = AllocationCatalog::new();
        let id = cat
            .register(
                FuType::std("mult16"),
                FuSpec {
                    allocation: 2,
                    area: 4.0,
                    latency: 2,
                    composition: vec![],
                },
            )
            .unwrap();
        assert_eq!(cat.fu_type(id).unwrap().name, "mult16");
        assert_eq!(cat.spec(id).unwrap().allocation, 2);
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut cat = AllocationCatalog::new();
        cat.register(FuType::std("adder"), FuSpec::default())
            .unwrap();
        let err = cat.register(FuType::std("adder"), FuSpec::default());
        assert!(matches!(err, Err(CatalogError::DuplicateType { .. })));
    }

    #[test]
    fn intern_auto_registers_with_pool_of_one() {
        let mut cat = AllocationCatalog::new();
        let id = cat.intern(FuType::std("shifter"));
        assert_eq!(cat.spec(id).unwrap().allocation, 1);
        // interning again yields the same id and does not reset the spec
        cat.spec_mut(id).unwrap().allocation = 3;
        let again = cat.intern(FuType::std("shifter"));
        assert_eq!(again, id);
        assert_eq!(cat.spec(id).unwrap().allocation, 3);
    }

    #[test]
    fn candidates_by_kind_key() {
        let mut cat = AllocationCatalog::new();
        let m = cat.intern(FuType::std("mult16"));
        cat.add_candidate("mul", m);
        assert_eq!(cat.candidates_for(&mul_op()), &[m]);
    }

    #[test]
    fn no_candidates_is_empty_slice() {
        let cat = AllocationCatalog::new();
        assert!(cat.candidates_for(&mul_op()).is_empty());
    }

    #[test]
    fn from_json_with_defaults() {
        let cat = AllocationCatalog::from_json(
            r#"[
                {"name": "mult16", "allocation": 2, "area": 4.0, "latency": 2, "kinds": ["mul"]},
                {"name": "alu", "kinds": ["add", "sub"]}
            ]"#,
        )
        .unwrap();
        let mult = cat.id_of(&FuType::std("mult16")).unwrap();
        let alu = cat.id_of(&FuType::std("alu")).unwrap();
        assert_eq!(cat.spec(mult).unwrap().latency, 2);
        // defaults: pool of one, unit area, single-cycle
        assert_eq!(cat.spec(alu).unwrap().allocation, 1);
        assert_eq!(cat.candidates_for(&mul_op()), &[mult]);
    }

    #[test]
    fn from_json_rejects_garbage() {
        let err = AllocationCatalog::from_json("not json");
        assert!(matches!(err, Err(CatalogError::DecodeError { .. })));
    }
}
