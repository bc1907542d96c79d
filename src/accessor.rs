//! Resolution of field references into read-only record accessors.
//!
//! A name either denotes a stored column, one of the intrinsic fields
//! (`_id`, `_key`), or a dotted chain that walks reference columns left
//! to right and ends in any of the former. Accessors are resolved once
//! per query and answer capability queries as pure functions of their
//! variant, so callers never need to know how a field is backed.

use crate::construct::{RecordId, Registry, Table, NO_RECORD};
use crate::datatype::{ColumnType, Value, ValueType};
use crate::error::{FacetbaseError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accessor {
    /// A stored column; reference columns project to the referenced key.
    Column { name: String },
    /// The intrinsic record identity.
    Id,
    /// The intrinsic record key of a keyed table.
    Key,
    /// A dotted chain of reference columns ending in `leaf`, resolved
    /// against `target`.
    Path {
        hops: Vec<String>,
        target: String,
        leaf: Box<Accessor>,
    },
}

impl Accessor {
    /// Resolve `name` against `table`. Every failing segment of a dotted
    /// name is reported by itself so callers can see where a chain broke.
    pub fn resolve(registry: &Registry, table: &Table, name: &str) -> Result<Accessor> {
        if !name.contains('.') {
            return Self::resolve_bare(table, name);
        }
        let segments: Vec<&str> = name.split('.').collect();
        let mut current = table;
        let mut hops = Vec::new();
        for segment in &segments[..segments.len() - 1] {
            let column = current.column(segment).ok_or_else(|| {
                FacetbaseError::UnknownField(format!("{segment} (in \"{name}\")"))
            })?;
            match column.column_type() {
                ColumnType::Reference { table: target } => {
                    current = registry.table(target)?;
                    hops.push((*segment).to_string());
                }
                _ => {
                    return Err(FacetbaseError::UnknownField(format!(
                        "{segment} (in \"{name}\", not a reference column)"
                    )));
                }
            }
        }
        let leaf = Self::resolve_bare(current, segments[segments.len() - 1])
            .map_err(|_| FacetbaseError::UnknownField(format!(
                "{} (in \"{name}\")",
                segments[segments.len() - 1]
            )))?;
        Ok(Accessor::Path {
            hops,
            target: current.name().to_string(),
            leaf: Box::new(leaf),
        })
    }

    fn resolve_bare(table: &Table, name: &str) -> Result<Accessor> {
        if name.starts_with('_') {
            // names under the underscore prefix are reserved for intrinsics
            return match name {
                "_id" => Ok(Accessor::Id),
                "_key" if table.key_type().is_some() => Ok(Accessor::Key),
                _ => Err(FacetbaseError::UnknownField(name.to_string())),
            };
        }
        if table.column(name).is_some() {
            Ok(Accessor::Column { name: name.to_string() })
        } else {
            Err(FacetbaseError::UnknownField(name.to_string()))
        }
    }

    /// True exactly for the synthetic intrinsic fields.
    pub fn is_accessor(&self) -> bool {
        matches!(self, Accessor::Id | Accessor::Key)
    }

    /// True exactly for the `_key` intrinsic; `_id` does not qualify.
    pub fn is_key_accessor(&self) -> bool {
        matches!(self, Accessor::Key)
    }

    /// The dotted path from the table root. Top-level intrinsics have no
    /// containing path, so they have no full name.
    pub fn full_name(&self) -> Option<String> {
        match self {
            Accessor::Column { name } => Some(name.clone()),
            Accessor::Id | Accessor::Key => None,
            Accessor::Path { hops, leaf, .. } => {
                let mut parts = hops.clone();
                parts.push(leaf.local_name().to_string());
                Some(parts.join("."))
            }
        }
    }

    /// What the field is called in isolation.
    pub fn local_name(&self) -> &str {
        match self {
            Accessor::Column { name } => name,
            Accessor::Id => "_id",
            Accessor::Key => "_key",
            Accessor::Path { leaf, .. } => leaf.local_name(),
        }
    }

    /// The projected value for `record`. Reference columns resolve to the
    /// referenced record's key; an unset reference projects as `""`,
    /// never as an error.
    pub fn value(&self, registry: &Registry, table: &Table, record: RecordId) -> Result<Value> {
        match self {
            Accessor::Id => Ok(Value::Int(record as i64)),
            Accessor::Key => table.key_of(record).cloned().ok_or_else(|| {
                FacetbaseError::Invariant(format!(
                    "record {record} of \"{}\" has no key",
                    table.name()
                ))
            }),
            Accessor::Column { name } => {
                let column = table
                    .column(name)
                    .ok_or_else(|| FacetbaseError::UnknownField(name.clone()))?;
                match column.column_type() {
                    ColumnType::Reference { table: target } => {
                        let id = match column.get(record) {
                            Value::Reference(id) => id,
                            _ => NO_RECORD,
                        };
                        if id == NO_RECORD {
                            return Ok(Value::text(""));
                        }
                        let target_table = registry.table(target)?;
                        target_table.key_of(id).cloned().ok_or_else(|| {
                            FacetbaseError::Invariant(format!(
                                "column \"{name}\" references missing record {id}"
                            ))
                        })
                    }
                    _ => Ok(column.get(record)),
                }
            }
            Accessor::Path { hops, target, leaf } => {
                let mut current_table = table;
                let mut current_record = record;
                for hop in hops {
                    let column = current_table
                        .column(hop)
                        .ok_or_else(|| FacetbaseError::UnknownField(hop.clone()))?;
                    let ColumnType::Reference { table: next } = column.column_type() else {
                        return Err(FacetbaseError::Invariant(format!(
                            "path hop \"{hop}\" is not a reference column"
                        )));
                    };
                    current_record = match column.get(current_record) {
                        Value::Reference(id) => id,
                        _ => NO_RECORD,
                    };
                    // a broken chain projects the same empty value as a bare unset reference
                    if current_record == NO_RECORD {
                        return Ok(Value::text(""));
                    }
                    current_table = registry.table(next)?;
                }
                debug_assert_eq!(current_table.name(), target);
                leaf.value(registry, current_table, current_record)
            }
        }
    }

    /// The statically known type of projected values, used by the
    /// compile-time literal check. Reference-backed accessors report the
    /// referenced table's key type.
    pub fn result_type(&self, registry: &Registry, table: &Table) -> Result<ValueType> {
        match self {
            Accessor::Id => Ok(ValueType::Int),
            Accessor::Key => table.key_type().ok_or_else(|| {
                FacetbaseError::Invariant(format!("table \"{}\" has no key", table.name()))
            }),
            Accessor::Column { name } => {
                let column = table
                    .column(name)
                    .ok_or_else(|| FacetbaseError::UnknownField(name.clone()))?;
                match column.column_type() {
                    ColumnType::Reference { table: target } => {
                        registry.table(target)?.key_type().ok_or_else(|| {
                            FacetbaseError::Invariant(format!(
                                "reference target \"{target}\" has no key"
                            ))
                        })
                    }
                    other => Ok(other.value_type()),
                }
            }
            Accessor::Path { target, leaf, .. } => {
                leaf.result_type(registry, registry.table(target)?)
            }
        }
    }

    /// Whether projection can yield the `""` sentinel regardless of the
    /// declared result type (unset references and broken chains do).
    pub fn may_project_empty(&self, table: &Table) -> bool {
        match self {
            Accessor::Column { name } => matches!(
                table.column(name).map(|c| c.column_type()),
                Some(ColumnType::Reference { .. })
            ),
            Accessor::Path { .. } => true,
            Accessor::Id | Accessor::Key => false,
        }
    }
}
