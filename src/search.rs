//! The seam to the full-text search primitive.
//!
//! The engine only ever sees a [`MatchStream`]: a one-shot, finite,
//! forward-only sequence of record identities for a single token. It is
//! produced once and consumed at most once per query; nothing here
//! supports rewinding or random access. [`TokenIndex`] is the built-in
//! collaborator (a snapshot inverted map over a text column) and
//! [`TokenScan`] is the indexless fallback.

use std::collections::HashMap;

use roaring::RoaringTreemap;

use crate::construct::{OtherHasher, RecordId, Table};
use crate::datatype::Value;

/// One-shot forward-only sequence of matching record identities, in
/// ascending identity order.
pub struct MatchStream<'a> {
    inner: Box<dyn Iterator<Item = RecordId> + 'a>,
}

impl<'a> MatchStream<'a> {
    pub fn new(inner: impl Iterator<Item = RecordId> + 'a) -> Self {
        Self { inner: Box::new(inner) }
    }
}

impl Iterator for MatchStream<'_> {
    type Item = RecordId;
    fn next(&mut self) -> Option<RecordId> {
        self.inner.next()
    }
}

/// A source of token matches. Implementations own whatever tokenization
/// and storage they like; the engine only combines the returned streams.
pub trait SearchIndex {
    fn search(&self, token: &str) -> MatchStream<'_>;
}

/// The shared tokenizer: lowercased alphanumeric runs. Query terms are
/// analyzed with the same rule as indexed text, so punctuation in either
/// never blocks a match.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

// ------------- TokenIndex -------------
/// Snapshot inverted index over one text column: lowercased alphanumeric
/// token -> identity set. Built explicitly; records added after the
/// build are not visible to it.
pub struct TokenIndex {
    postings: HashMap<String, RoaringTreemap, OtherHasher>,
}

impl TokenIndex {
    pub fn build(table: &Table, column: &str) -> Self {
        let mut postings: HashMap<String, RoaringTreemap, OtherHasher> = HashMap::default();
        if let Some(column) = table.column(column) {
            for record in table.records().iter() {
                if let Value::Text(text) = column.get(record) {
                    for token in tokenize(&text) {
                        postings.entry(token).or_default().insert(record);
                    }
                }
            }
        }
        Self { postings }
    }

    pub fn token_count(&self) -> usize {
        self.postings.len()
    }
}

impl SearchIndex for TokenIndex {
    fn search(&self, token: &str) -> MatchStream<'_> {
        MatchStream::new(
            self.postings
                .get(&token.to_lowercase())
                .into_iter()
                .flat_map(|set| set.iter()),
        )
    }
}

// ------------- TokenScan -------------
/// Indexless fallback: lazily walks a text column in identity order and
/// reports records whose text contains the token, case-insensitively.
pub struct TokenScan<'a> {
    table: &'a Table,
    column: &'a str,
}

impl<'a> TokenScan<'a> {
    pub fn new(table: &'a Table, column: &'a str) -> Self {
        Self { table, column }
    }
}

impl SearchIndex for TokenScan<'_> {
    fn search(&self, token: &str) -> MatchStream<'_> {
        let needle = token.to_lowercase();
        let table = self.table;
        let column = self.column;
        MatchStream::new(table.records().iter().filter(move |record| {
            table.column(column).is_some_and(|c| match c.get(*record) {
                Value::Text(text) => text.to_lowercase().contains(&needle),
                _ => false,
            })
        }))
    }
}
