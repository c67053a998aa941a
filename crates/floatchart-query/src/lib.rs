//! Natural-language question understanding for ARGO float data.
//!
//! Text goes through [`extractor`], [`intent`], [`plan`] and [`sql`] to become a
//! parameterized statement plus a chart hint. [`QueryEngine`] runs the whole pipeline.

pub mod engine;
pub mod error;
pub mod extractor;
pub mod gazetteer;
pub mod intent;
pub mod plan;
pub mod sql;

pub use engine::{QueryEngine, QueryRequest, UnderstoodQuery};
pub use error::QueryError;
pub use extractor::{normalize, EntityExtractor, ExtractedEntities, Threshold, TimeRange};
pub use gazetteer::{Gazetteer, UnresolvedLocation};
pub use intent::{classify_by_rules, Classification, IntentClassifier, IntentSource, QueryIntent};
pub use plan::{Aggregation, Breakdown, QueryPlan, QuerySettings};
pub use sql::{compile, CompiledQuery, ResultDescriptor, ResultShape, SqlValue};
