//! Storage layer for points, measures and computation results.
//!
//! The store owns every row of a point: its measures, the deduplicated date and
//! depth indexes, and the single computation generation. Writes go through the
//! generation lifecycle of [`ResultsStore`]; reads only ever see a completed
//! generation.
//!
//! # Modules
//!
//! - `backend`: [`ResultsStore`] trait and the shared-store handle
//! - `schema`: SQL schema applied when a store is opened
//! - `sqlite`: SQLite implementation of the trait
//! - `queries`: Typed read queries used by the SQLite implementation
//! - `models`: Storage record types separate from solver outputs
//! - `export`: CSV export of cleaned measures

pub mod backend;
pub mod export;
pub mod models;
mod queries;
pub mod schema;
pub mod sqlite;

pub use backend::{lock_store, share, ResultsStore, SharedStore};
pub use export::{export_cleaned_measures, ExportedFiles};
pub use models::{
    DepthTimeGrid, Generation, GenerationCounts, LayerRecord, PointRecord, QuantileGrids,
    RmseRecord,
};
pub use sqlite::SqliteStore;
