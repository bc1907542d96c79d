//! The select operation: filtering, projection and drill-down.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use roaring::RoaringTreemap;
use serde::Serialize;
use tracing::{debug, trace};

use crate::accessor::Accessor;
use crate::construct::{Column, OtherHasher, RecordId, Registry, Table, NO_RECORD};
use crate::datatype::{ColumnType, Value};
use crate::error::{FacetbaseError, Result};
use crate::filter::{self, CompareOp, Expr, MatchTerm, QueryFlags};
use crate::search::{tokenize, SearchIndex, TokenScan};

// ------------- MatchSet -------------
/// An ordered set of matched record identities: nothing, a single
/// identity, or a bitmap.
#[derive(Debug)]
pub enum MatchSet {
    Empty,
    One(RecordId),
    Many(RoaringTreemap),
}

impl MatchSet {
    pub fn new() -> Self {
        MatchSet::Empty
    }
    pub fn push(&mut self, record: RecordId) {
        match self {
            MatchSet::Empty => *self = MatchSet::One(record),
            MatchSet::One(first) => {
                let mut many = RoaringTreemap::new();
                many.insert(*first);
                many.insert(record);
                *self = MatchSet::Many(many);
            }
            MatchSet::Many(many) => {
                many.insert(record);
            }
        }
    }
    pub fn len(&self) -> u64 {
        match self {
            MatchSet::Empty => 0,
            MatchSet::One(_) => 1,
            MatchSet::Many(many) => many.len(),
        }
    }
    pub fn is_empty(&self) -> bool {
        matches!(self, MatchSet::Empty)
    }
    /// Identities in ascending (= creation) order.
    pub fn iter(&self) -> Box<dyn Iterator<Item = RecordId> + '_> {
        match self {
            MatchSet::Empty => Box::new(std::iter::empty()),
            MatchSet::One(record) => Box::new(std::iter::once(*record)),
            MatchSet::Many(many) => Box::new(many.iter()),
        }
    }
}

impl Default for MatchSet {
    fn default() -> Self {
        Self::new()
    }
}

// ------------- options and results -------------
#[derive(Debug, Clone, Default)]
pub struct SelectOptions {
    /// Textual filter expression; absent means every record matches.
    pub filter: Option<String>,
    /// Match-term query against the table's default match column.
    pub query: Option<String>,
    pub flags: QueryFlags,
    /// Ordered output accessor names; absent means `_id`, `_key` (keyed
    /// tables), then every stored column.
    pub output_columns: Option<Vec<String>>,
    /// Bound emitted rows only; the reported hit count is unaffected.
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    /// Drill-down dimensions, each aggregated independently.
    pub drill_down: Vec<String>,
    /// Per-group projection; absent means `_key`, `_nsubrecs`.
    pub drill_down_output_columns: Option<Vec<String>>,
    /// Bound emitted group rows per dimension, not the group count.
    pub drill_down_limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct DrillDownResult {
    /// Distinct group values over the whole match set.
    pub group_count: u64,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Serialize)]
pub struct SelectResult {
    /// Match-set size before any limit or offset.
    pub hit_count: u64,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub drill_down: HashMap<String, DrillDownResult, OtherHasher>,
}

impl SelectResult {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

// ------------- Engine -------------
enum Grouping<'t> {
    /// Group by the accessor's projected value.
    ByValue,
    /// Reference dimensions group by referenced identity so group rows
    /// can project the referenced record; unset references join no group.
    ByReference { column: &'t Column, target: &'t Table },
}

enum DrillOut {
    GroupValue,
    MemberCount,
    Referenced(Accessor),
}

struct Group {
    members: u64,
}

pub struct Engine<'r> {
    registry: &'r Registry,
}

impl<'r> Engine<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    /// Run one select against a table. Parsing, filtering, projection
    /// and drill-down happen synchronously within this call; any error
    /// is terminal for the query and leaves the registry untouched.
    pub fn select(&self, table_name: &str, options: &SelectOptions) -> Result<SelectResult> {
        let table = self.registry.table(table_name)?;
        debug!(table = table_name, "executing select");

        let filter_expr = options
            .filter
            .as_deref()
            .map(|text| filter::compile(self.registry, table, text, options.flags))
            .transpose()?;
        let query_terms = options
            .query
            .as_deref()
            .map(|text| filter::parse_query(text, options.flags))
            .transpose()?;

        let match_sets = self.prepare_match_sets(table, filter_expr.as_ref())?;
        let query_set = match &query_terms {
            Some(terms) => {
                let column = self.default_match_column(table)?;
                Some(self.match_terms_set(table, &column, terms)?)
            }
            None => None,
        };

        let mut matched = MatchSet::new();
        for record in table.records().iter() {
            if let Some(set) = &query_set {
                if !set.contains(record) {
                    continue;
                }
            }
            if let Some(expr) = &filter_expr {
                if !self.eval(expr, table, record, &match_sets)? {
                    continue;
                }
            }
            matched.push(record);
        }
        trace!(table = table_name, hits = matched.len(), "primary match set");

        let output = match &options.output_columns {
            Some(names) => names.clone(),
            None => default_output(table),
        };
        let accessors = output
            .iter()
            .map(|name| Accessor::resolve(self.registry, table, name))
            .collect::<Result<Vec<_>>>()?;

        let offset = options.offset.unwrap_or(0);
        let limit = options.limit.unwrap_or(usize::MAX);
        let mut rows = Vec::new();
        for record in matched.iter().skip(offset).take(limit) {
            let row = accessors
                .iter()
                .map(|accessor| accessor.value(self.registry, table, record))
                .collect::<Result<Vec<_>>>()?;
            rows.push(row);
        }

        let mut drill_down: HashMap<String, DrillDownResult, OtherHasher> = HashMap::default();
        for dimension in &options.drill_down {
            let result = self.drill_down(table, &matched, dimension, options)?;
            drill_down.insert(dimension.clone(), result);
        }

        Ok(SelectResult {
            hit_count: matched.len(),
            columns: output,
            rows,
            drill_down,
        })
    }

    /// One identity set per match node, each stream consumed exactly once.
    fn prepare_match_sets(&self, table: &Table, expr: Option<&Expr>) -> Result<Vec<RoaringTreemap>> {
        let mut sets = Vec::new();
        let Some(expr) = expr else { return Ok(sets) };
        let mut nodes: Vec<(usize, &str, &[MatchTerm])> = Vec::new();
        expr.collect_matches(&mut nodes);
        nodes.sort_by_key(|(ordinal, ..)| *ordinal);
        for (ordinal, column, terms) in nodes {
            debug_assert_eq!(ordinal, sets.len());
            sets.push(self.match_terms_set(table, column, terms)?);
        }
        Ok(sets)
    }

    fn match_terms_set(
        &self,
        table: &Table,
        column: &str,
        terms: &[MatchTerm],
    ) -> Result<RoaringTreemap> {
        let scan;
        let provider: &dyn SearchIndex = match self.registry.token_index(table.name(), column) {
            Some(index) => index,
            None => {
                scan = TokenScan::new(table, column);
                &scan
            }
        };
        let mut positive: Option<RoaringTreemap> = None;
        let mut negative = RoaringTreemap::new();
        for term in terms {
            // analyze the term with the index tokenizer; multi-token
            // terms match records containing every token
            let mut term_set: Option<RoaringTreemap> = None;
            for token in tokenize(&term.token) {
                let set: RoaringTreemap = provider.search(&token).collect();
                term_set = Some(match term_set {
                    Some(mut acc) => {
                        acc &= set;
                        acc
                    }
                    None => set,
                });
            }
            let set = term_set.unwrap_or_default();
            if term.negated {
                negative |= set;
            } else {
                positive = Some(match positive {
                    Some(mut acc) => {
                        acc &= set;
                        acc
                    }
                    None => set,
                });
            }
        }
        // a purely negative query subtracts from the whole table
        let mut matched = positive.unwrap_or_else(|| table.records().clone());
        matched -= negative;
        trace!(column, hits = matched.len(), "match term set");
        Ok(matched)
    }

    fn default_match_column(&self, table: &Table) -> Result<String> {
        let mut first_text: Option<&str> = None;
        for column in table.columns() {
            if *column.column_type() == ColumnType::Text {
                if self.registry.token_index(table.name(), column.name()).is_some() {
                    return Ok(column.name().to_string());
                }
                first_text.get_or_insert(column.name());
            }
        }
        first_text.map(str::to_string).ok_or_else(|| {
            FacetbaseError::UnknownField(format!(
                "query (table \"{}\" has no text column to match)",
                table.name()
            ))
        })
    }

    fn eval(
        &self,
        expr: &Expr,
        table: &Table,
        record: RecordId,
        match_sets: &[RoaringTreemap],
    ) -> Result<bool> {
        match expr {
            Expr::Compare { accessor, op, literal, .. } => {
                let value = accessor.value(self.registry, table, record)?;
                match value.natural_cmp(literal) {
                    Ok(ordering) => Ok(op.matches(ordering)),
                    // an unset reference projects "": unequal to and
                    // unordered against values of any other type
                    Err(mismatch) => {
                        let value_empty = matches!(&value, Value::Text(s) if s.is_empty());
                        let literal_empty = matches!(literal, Value::Text(s) if s.is_empty());
                        if value_empty || literal_empty {
                            match op {
                                CompareOp::Equal => Ok(false),
                                CompareOp::NotEqual => Ok(true),
                                _ if value_empty => Ok(false),
                                _ => Err(mismatch),
                            }
                        } else {
                            Err(mismatch)
                        }
                    }
                }
            }
            Expr::Match { ordinal, .. } => Ok(match_sets
                .get(*ordinal)
                .is_some_and(|set| set.contains(record))),
            Expr::And(left, right) => {
                Ok(self.eval(left, table, record, match_sets)?
                    && self.eval(right, table, record, match_sets)?)
            }
            Expr::Or(left, right) => {
                Ok(self.eval(left, table, record, match_sets)?
                    || self.eval(right, table, record, match_sets)?)
            }
            Expr::Not(inner) => Ok(!self.eval(inner, table, record, match_sets)?),
        }
    }

    fn drill_down(
        &self,
        table: &Table,
        matched: &MatchSet,
        dimension: &str,
        options: &SelectOptions,
    ) -> Result<DrillDownResult> {
        let accessor = Accessor::resolve(self.registry, table, dimension)?;
        let grouping = match &accessor {
            Accessor::Column { name } => {
                let column = table
                    .column(name)
                    .ok_or_else(|| FacetbaseError::UnknownField(name.clone()))?;
                match column.column_type() {
                    ColumnType::Reference { table: target } => Grouping::ByReference {
                        column,
                        target: self.registry.table(target)?,
                    },
                    _ => Grouping::ByValue,
                }
            }
            _ => Grouping::ByValue,
        };

        // group in first-appearance order over the match set
        let mut order: Vec<Value> = Vec::new();
        let mut groups: HashMap<Value, Group, OtherHasher> = HashMap::default();
        for record in matched.iter() {
            let key = match &grouping {
                Grouping::ByReference { column, .. } => match column.get(record) {
                    Value::Reference(NO_RECORD) => continue,
                    value @ Value::Reference(_) => value,
                    _ => continue,
                },
                Grouping::ByValue => accessor.value(self.registry, table, record)?,
            };
            match groups.entry(key) {
                Entry::Occupied(mut occupied) => occupied.get_mut().members += 1,
                Entry::Vacant(vacant) => {
                    order.push(vacant.key().clone());
                    vacant.insert(Group { members: 1 });
                }
            }
        }

        let out_names = options
            .drill_down_output_columns
            .clone()
            .unwrap_or_else(|| vec!["_key".to_string(), "_nsubrecs".to_string()]);
        let outs = out_names
            .iter()
            .map(|name| match name.as_str() {
                "_key" => Ok(DrillOut::GroupValue),
                "_nsubrecs" => Ok(DrillOut::MemberCount),
                other => match &grouping {
                    Grouping::ByReference { target, .. } => Ok(DrillOut::Referenced(
                        Accessor::resolve(self.registry, target, other)?,
                    )),
                    Grouping::ByValue => Err(FacetbaseError::UnknownField(format!(
                        "{other} (drill-down dimension \"{dimension}\" has no stored columns)"
                    ))),
                },
            })
            .collect::<Result<Vec<_>>>()?;

        let limit = options.drill_down_limit.unwrap_or(usize::MAX);
        let mut rows = Vec::new();
        for key in order.iter().take(limit) {
            let group = groups
                .get(key)
                .ok_or_else(|| FacetbaseError::Invariant("drill-down group vanished".to_string()))?;
            let mut row = Vec::with_capacity(outs.len());
            for out in &outs {
                let value = match out {
                    DrillOut::GroupValue => match (&grouping, key) {
                        (Grouping::ByReference { target, .. }, Value::Reference(id)) => {
                            target.key_of(*id).cloned().ok_or_else(|| {
                                FacetbaseError::Invariant(format!(
                                    "drill-down group references missing record {id}"
                                ))
                            })?
                        }
                        _ => key.clone(),
                    },
                    DrillOut::MemberCount => Value::Int(group.members as i64),
                    DrillOut::Referenced(accessor) => match (&grouping, key) {
                        (Grouping::ByReference { target, .. }, Value::Reference(id)) => {
                            accessor.value(self.registry, target, *id)?
                        }
                        _ => {
                            return Err(FacetbaseError::Invariant(
                                "referenced projection outside a reference dimension".to_string(),
                            ));
                        }
                    },
                };
                row.push(value);
            }
            rows.push(row);
        }
        trace!(dimension, groups = order.len(), "drill-down dimension");

        Ok(DrillDownResult {
            group_count: order.len() as u64,
            columns: out_names,
            rows,
        })
    }
}

fn default_output(table: &Table) -> Vec<String> {
    let mut output = vec!["_id".to_string()];
    if table.key_type().is_some() {
        output.push("_key".to_string());
    }
    for column in table.columns() {
        output.push(column.name().to_string());
    }
    output
}
