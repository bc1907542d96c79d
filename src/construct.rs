use std::collections::HashMap;

// used to keep the one-to-one mapping between record keys and their assigned identities
use bimap::BiMap;

// record identity sets iterate in ascending (= creation) order
use roaring::RoaringTreemap;

// we will use a fast hashing algo for hashmaps whose keys are not record identities
use core::hash::BuildHasherDefault;
use seahash::SeaHasher;

use tracing::debug;

use crate::datatype::{ColumnType, Value, ValueType};
use crate::error::{FacetbaseError, Result};
use crate::search::TokenIndex;

// ------------- RecordId -------------
pub type RecordId = u64;

pub type RecordHasher = BuildHasherDefault<SeaHasher>;
pub type OtherHasher = BuildHasherDefault<SeaHasher>;

/// The reference sentinel for "points at nothing".
pub const NO_RECORD: RecordId = 0;

#[derive(Debug)]
pub struct RecordIdGenerator {
    lower_bound: RecordId,
}

impl RecordIdGenerator {
    pub fn new() -> Self {
        Self { lower_bound: NO_RECORD }
    }
    // Identities are handed out monotonically starting at 1 and are never reused,
    // so ascending identity order is creation order.
    pub fn generate(&mut self) -> RecordId {
        self.lower_bound += 1;
        self.lower_bound
    }
    pub fn last(&self) -> RecordId {
        self.lower_bound
    }
}

// ------------- Column -------------
/// Typed, named storage attached to a table. Cells are sparse; reading a
/// cell that was never set yields the column type's empty value.
#[derive(Debug)]
pub struct Column {
    name: String,
    column_type: ColumnType,
    cells: HashMap<RecordId, Value, RecordHasher>,
}

impl Column {
    fn new(name: String, column_type: ColumnType) -> Self {
        Self {
            name,
            column_type,
            cells: HashMap::default(),
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn column_type(&self) -> &ColumnType {
        &self.column_type
    }
    pub fn get(&self, record: RecordId) -> Value {
        self.cells
            .get(&record)
            .cloned()
            .unwrap_or_else(|| self.column_type.empty_value())
    }
    fn set(&mut self, record: RecordId, value: Value) -> Result<()> {
        if value.value_type() != self.column_type.value_type() {
            return Err(FacetbaseError::Type(format!(
                "column \"{}\" holds {}, not {}",
                self.name,
                self.column_type,
                value.value_type()
            )));
        }
        self.cells.insert(record, value);
        Ok(())
    }
}

// ------------- Table -------------
/// An ordered collection of records. Keyed tables map a unique key value
/// to each identity both ways; keyless tables only append.
#[derive(Debug)]
pub struct Table {
    name: String,
    key_type: Option<ValueType>,
    keys: BiMap<Value, RecordId>,
    columns: Vec<Column>,
    column_index: HashMap<String, usize, OtherHasher>,
    records: RoaringTreemap,
    generator: RecordIdGenerator,
}

impl Table {
    fn new(name: String, key_type: Option<ValueType>) -> Self {
        Self {
            name,
            key_type,
            keys: BiMap::new(),
            columns: Vec::new(),
            column_index: HashMap::default(),
            records: RoaringTreemap::new(),
            generator: RecordIdGenerator::new(),
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn key_type(&self) -> Option<ValueType> {
        self.key_type
    }
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.column_index.get(name).map(|i| &self.columns[*i])
    }
    /// Stored columns in definition order.
    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter()
    }
    pub fn records(&self) -> &RoaringTreemap {
        &self.records
    }
    pub fn len(&self) -> u64 {
        self.records.len()
    }
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
    pub fn contains(&self, record: RecordId) -> bool {
        self.records.contains(record)
    }
    pub fn key_of(&self, record: RecordId) -> Option<&Value> {
        self.keys.get_by_right(&record)
    }
    pub fn id_of(&self, key: &Value) -> Option<RecordId> {
        self.keys.get_by_left(key).copied()
    }

    fn create_column(&mut self, name: &str, column_type: ColumnType) -> Result<()> {
        if name.starts_with('_') {
            return Err(FacetbaseError::Schema(format!(
                "column name \"{name}\" is reserved"
            )));
        }
        if self.column_index.contains_key(name) {
            return Err(FacetbaseError::Schema(format!(
                "table \"{}\" already has a column \"{name}\"",
                self.name
            )));
        }
        self.column_index.insert(name.to_string(), self.columns.len());
        self.columns.push(Column::new(name.to_string(), column_type));
        Ok(())
    }

    fn add(&mut self, key: Value) -> Result<RecordId> {
        let Some(key_type) = self.key_type else {
            return Err(FacetbaseError::Schema(format!(
                "table \"{}\" takes no key; use append",
                self.name
            )));
        };
        if key.value_type() != key_type {
            return Err(FacetbaseError::Type(format!(
                "table \"{}\" is keyed by {}, not {}",
                self.name,
                key_type,
                key.value_type()
            )));
        }
        // adding an existing key yields the record it already names
        if let Some(existing) = self.keys.get_by_left(&key) {
            return Ok(*existing);
        }
        let record = self.generator.generate();
        self.keys.insert(key, record);
        self.records.insert(record);
        Ok(record)
    }

    fn append(&mut self) -> Result<RecordId> {
        if self.key_type.is_some() {
            return Err(FacetbaseError::Schema(format!(
                "table \"{}\" is keyed; use add",
                self.name
            )));
        }
        let record = self.generator.generate();
        self.records.insert(record);
        Ok(record)
    }

    fn set_cell(&mut self, record: RecordId, column: &str, value: Value) -> Result<()> {
        if !self.records.contains(record) {
            return Err(FacetbaseError::Schema(format!(
                "table \"{}\" has no record {record}",
                self.name
            )));
        }
        let index = *self
            .column_index
            .get(column)
            .ok_or_else(|| FacetbaseError::UnknownField(column.to_string()))?;
        self.columns[index].set(record, value)
    }
}

// ------------- Registry -------------
/// The explicit handle to every table the engine can see. Mutation goes
/// through `&mut self`; queries only ever borrow `&self`.
pub struct Registry {
    tables: HashMap<String, Table, OtherHasher>,
    token_indexes: HashMap<(String, String), TokenIndex, OtherHasher>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            tables: HashMap::default(),
            token_indexes: HashMap::default(),
        }
    }

    pub fn table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| FacetbaseError::Schema(format!("unknown table \"{name}\"")))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| FacetbaseError::Schema(format!("unknown table \"{name}\"")))
    }

    pub fn create_table(&mut self, name: &str, key_type: Option<ValueType>) -> Result<()> {
        if key_type == Some(ValueType::Reference) {
            return Err(FacetbaseError::Schema(format!(
                "table \"{name}\" cannot be keyed by references"
            )));
        }
        if self.tables.contains_key(name) {
            return Err(FacetbaseError::Schema(format!(
                "table \"{name}\" already exists"
            )));
        }
        debug!(table = name, "creating table");
        self.tables
            .insert(name.to_string(), Table::new(name.to_string(), key_type));
        Ok(())
    }

    pub fn create_column(&mut self, table: &str, name: &str, column_type: ColumnType) -> Result<()> {
        if let ColumnType::Reference { table: target } = &column_type {
            if self.table(target)?.key_type().is_none() {
                return Err(FacetbaseError::Schema(format!(
                    "reference target \"{target}\" has no key"
                )));
            }
        }
        debug!(table, column = name, "creating column");
        self.table_mut(table)?.create_column(name, column_type)
    }

    pub fn add(&mut self, table: &str, key: Value) -> Result<RecordId> {
        self.table_mut(table)?.add(key)
    }

    pub fn append(&mut self, table: &str) -> Result<RecordId> {
        self.table_mut(table)?.append()
    }

    /// Set a cell. Reference columns accept either a `Value::Reference`
    /// into the target table or the target record's key, which is
    /// resolved here; both are checked against the target's records.
    pub fn set(&mut self, table: &str, record: RecordId, column: &str, value: Value) -> Result<()> {
        let resolved = {
            let owner = self.table(table)?;
            let column = owner
                .column(column)
                .ok_or_else(|| FacetbaseError::UnknownField(column.to_string()))?;
            match column.column_type() {
                ColumnType::Reference { table: target } => {
                    let target_table = self.table(target)?;
                    let id = match &value {
                        Value::Reference(id) => {
                            if *id != NO_RECORD && !target_table.contains(*id) {
                                return Err(FacetbaseError::Schema(format!(
                                    "table \"{target}\" has no record {id}"
                                )));
                            }
                            *id
                        }
                        key => target_table.id_of(key).ok_or_else(|| {
                            FacetbaseError::Schema(format!(
                                "table \"{target}\" has no record keyed {key}"
                            ))
                        })?,
                    };
                    Value::Reference(id)
                }
                _ => value,
            }
        };
        self.table_mut(table)?.set_cell(record, column, resolved)
    }

    /// Build (or rebuild) the snapshot token index collaborator over a
    /// text column. Records added afterwards are not visible to it.
    pub fn build_token_index(&mut self, table: &str, column: &str) -> Result<()> {
        let index = {
            let owner = self.table(table)?;
            let col = owner
                .column(column)
                .ok_or_else(|| FacetbaseError::UnknownField(column.to_string()))?;
            if col.column_type().value_type() != ValueType::Text {
                return Err(FacetbaseError::Type(format!(
                    "cannot token-index column \"{column}\" of type {}",
                    col.column_type()
                )));
            }
            TokenIndex::build(owner, column)
        };
        debug!(table, column, "built token index");
        self.token_indexes
            .insert((table.to_string(), column.to_string()), index);
        Ok(())
    }

    pub fn token_index(&self, table: &str, column: &str) -> Option<&TokenIndex> {
        self.token_indexes
            .get(&(table.to_string(), column.to_string()))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
