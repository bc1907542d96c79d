//! Facetbase – a faceted query engine over keyed in-memory tables.
//!
//! Facetbase centers on the *select* operation: filter a table with a
//! compiled expression, project the matching records, and optionally
//! re-group the same match set per drill-down dimension:
//! * A [`construct::Table`] is an ordered collection of records, each
//!   with an immutable integer identity (`_id`) and, for keyed tables,
//!   a unique key (`_key`).
//! * A [`construct::Column`] is typed storage attached to a table;
//!   reference columns point at another table's records and project as
//!   that record's key.
//! * An [`accessor::Accessor`] is a resolved, read-only view of a
//!   record property: a stored column or a synthetic intrinsic.
//! * A [`filter::Expr`] is an immutable filter tree compiled once per
//!   query from a small infix language.
//! * A [`select::Engine`] runs the whole pipeline against a
//!   [`construct::Registry`], the explicit handle owning every table.
//!
//! ## Modules
//! * [`construct`] – Tables, columns, record identities and the registry.
//! * [`datatype`] – The tagged value variant and the granular time type.
//! * [`accessor`] – Field resolution, capability queries, projection.
//! * [`filter`] – The filter language: lexer, parser, expression tree.
//! * [`select`] – Evaluation, projection and drill-down aggregation.
//! * [`search`] – The seam to the full-text search primitive.
//! * [`error`] – The error taxonomy.
//!
//! ## Quick Start
//! ```
//! use facetbase::construct::Registry;
//! use facetbase::datatype::{ColumnType, Value, ValueType};
//! use facetbase::select::{Engine, SelectOptions};
//!
//! let mut registry = Registry::new();
//! registry.create_table("Books", Some(ValueType::Text)).unwrap();
//! registry.create_table("Users", Some(ValueType::Text)).unwrap();
//! registry
//!     .create_column("Users", "book", ColumnType::Reference { table: "Books".into() })
//!     .unwrap();
//! let book = registry.add("Books", Value::text("the groonga book")).unwrap();
//! let user = registry.add("Users", Value::text("morita")).unwrap();
//! registry.set("Users", user, "book", Value::Reference(book)).unwrap();
//!
//! let engine = Engine::new(&registry);
//! let result = engine
//!     .select("Users", &SelectOptions {
//!         output_columns: Some(vec!["_key".into(), "book".into()]),
//!         ..SelectOptions::default()
//!     })
//!     .unwrap();
//! assert_eq!(result.hit_count, 1);
//! assert_eq!(result.rows[0], vec![Value::text("morita"), Value::text("the groonga book")]);
//! ```
//!
//! ## Errors
//! Queries fail with a [`error::FacetbaseError`]: syntax errors from
//! the filter parser, unknown fields from the resolver, type mismatches
//! from the compile-time literal check. Zero matches, zero groups and
//! unset references are ordinary results, never errors, and a failed
//! query never corrupts registry state for the next one.

pub mod accessor;
pub mod construct;
pub mod datatype;
pub mod error;
pub mod filter;
pub mod search;
pub mod select;
