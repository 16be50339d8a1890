use serde::{Deserialize, Serialize};

use crate::domain::ColumnId;

/// Legacy schemas mark their creation timestamp with this column id but
/// declare it as text. Kept as a compatibility shim; the declared kind is
/// authoritative for everything else.
pub const CREATED_AT_COLUMN: &str = "createdAt";

/// Declared cell type of a column. The engine never infers types beyond
/// what the schema states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    Text,
    Date,
    Url,
}

/// One column of a server-defined table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub id: ColumnId,
    pub label: String,
    pub kind: ColumnKind,
}

impl ColumnSpec {
    pub fn new(id: impl Into<ColumnId>, label: impl Into<String>, kind: ColumnKind) -> Self {
        ColumnSpec {
            id: id.into(),
            label: label.into(),
            kind,
        }
    }
}

/// Ordered column schema supplied by the host at mount time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<ColumnSpec>,
}

impl Schema {
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        Schema { columns }
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Option<&ColumnSpec> {
        self.columns.get(index)
    }

    pub fn index_of(&self, id: &ColumnId) -> Option<usize> {
        self.columns.iter().position(|c| &c.id == id)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Render-agnostic column descriptor handed to whatever paints the table.
/// Carries no formatting logic, only identity and filter capabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub id: ColumnId,
    pub label: String,
    pub kind: ColumnKind,
    pub range_filterable: bool,
}

/// Pure mapping from a schema to its descriptor list. A column takes a date
/// range filter when its declared kind is `Date`, or when it carries the
/// legacy `createdAt` id regardless of kind.
pub fn descriptors(schema: &Schema) -> Vec<ColumnDescriptor> {
    schema
        .columns()
        .iter()
        .map(|spec| ColumnDescriptor {
            id: spec.id.clone(),
            label: spec.label.clone(),
            kind: spec.kind,
            range_filterable: spec.kind == ColumnKind::Date
                || spec.id.as_str() == CREATED_AT_COLUMN,
        })
        .collect()
}
