//! Molonari: lifecycle of heat-transport inversions for river-bed monitoring points.
//!
//! A monitoring point is a shaft driven into a river bed, carrying a pressure
//! sensor and a column of thermometers. This crate manages everything that
//! happens between cleaned field measures and displayable results:
//! - Validating and running forward models and Monte-Carlo calibrations
//! - Persisting each computation as one generation, written step by step
//! - Deriving the point's state from what is actually stored
//! - Serving state-aware read models (maps, curves, RMSE, histograms)
//!
//! The numerical solver itself is external and plugs in through
//! [`solver::Solver`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │  Presentation layer (external)                      │
//! └─────────────────────────────────────────────────────┘
//!          │ run / delete                 │ read models
//! ┌──────────────────────────┐   ┌──────────────────────────┐
//! │ Worker Layer (worker/)   │   │ Coordinator (coordinator/)│
//! │ - Orchestrator           │──▶│ - Cached read models     │
//! │ - Generation runner      │ ev│ - State-aware accessors  │
//! └──────────────────────────┘   └──────────────────────────┘
//!          │ commits                      │ queries
//! ┌─────────────────────────────────────────────────────┐
//! │  Storage Layer (storage/)                           │
//! │  - ResultsStore trait, SQLite implementation        │
//! │  - Generation lifecycle, CSV export                 │
//! └─────────────────────────────────────────────────────┘
//!                        │
//! ┌─────────────────────────────────────────────────────┐
//! │  Domain (domain/), Solver contract (solver/)        │
//! │  - State machine, parameters, quantiles, errors     │
//! │  - Discretization, RMSE, posterior statistics       │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`domain`]: Points, measures, parameters, state machine and errors
//! - [`storage`]: Persistence behind the [`ResultsStore`] trait
//! - [`solver`]: Solver contract, discretization and statistics
//! - [`worker`]: [`ComputationOrchestrator`] and its worker threads
//! - [`coordinator`]: [`PointCoordinator`] read models
//! - [`infrastructure`]: Data directory resolution
//! - [`observability`]: OpenTelemetry tracing with JSON-lines export
//!
//! # Example
//!
//! ```no_run
//! use molonari::{share, Config, ComputationOrchestrator, PointCoordinator, ResultKind};
//! # fn demo(solver: std::sync::Arc<dyn molonari::solver::Solver>, point: molonari::PointId,
//! #         layers: &[molonari::LayerParameters]) -> molonari::Result<()> {
//! let config = Config::default();
//! molonari::observability::init_tracing(&config);
//!
//! let store = share(config.open_store()?);
//! let orchestrator = ComputationOrchestrator::new(store.clone(), solver, &config);
//! let mut coordinator = PointCoordinator::new(store, point, &config)?
//!     .with_events(orchestrator.subscribe());
//!
//! orchestrator.run_direct(point, &[0.0, 0.3, 0.6], layers, 20)?.wait()?;
//! let maps = coordinator.depth_time_maps(ResultKind::Temperature)?;
//! assert_eq!(maps.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! # Key Design Decisions
//!
//! ## Derived state
//!
//! The computation state is never stored. It is recomputed from row counts,
//! counting only quantiles of a completed generation, so a crash mid-write
//! leaves the point in its previous state.
//!
//! ## One generation per point
//!
//! Recomputing requires deleting the previous generation. The only exception
//! is upgrading a direct model to a calibration, where the worker replaces
//! the old generation once the new one is solved.
//!
//! ## Cooperative cancellation
//!
//! Deleting a generation or the cleaned measures while a computation runs
//! does not interrupt the solver. The worker notices at commit time and
//! discards its results.

#![allow(clippy::multiple_crate_versions)]

pub mod coordinator;
pub mod domain;
pub mod infrastructure;
pub mod observability;
pub mod solver;
pub mod storage;
pub mod worker;

pub use coordinator::PointCoordinator;
pub use domain::{
    CleanedMeasure, ComputationState, LayerParameters, LayerPriors, MolonariError, Parameter,
    PointId, PointSetup, PriorRange, Quantile, RawMeasure, Result, ResultKind,
};
pub use storage::{share, ResultsStore, SharedStore, SqliteStore};
pub use worker::{ComputationEvent, ComputationHandle, ComputationOrchestrator, ComputationOutcome};

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Runtime configuration.
///
/// Every field has a default, so a configuration file only lists what it
/// changes:
///
/// ```toml
/// database_path = "~/molonari/site.sqlite"
/// trace_level = "molonari=debug"
/// max_posterior_samples = 500
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file. `None` keeps everything in memory.
    pub database_path: Option<PathBuf>,

    /// Directory for the span file. Default: see [`infrastructure::paths`].
    pub data_dir: PathBuf,

    /// `EnvFilter` directive for tracing. Default: `"info"`
    pub trace_level: Option<String>,

    /// Upper bound on stored posterior samples per layer. Default: 1000
    pub max_posterior_samples: usize,

    /// Bins of parameter histograms. Default: 60
    pub histogram_bins: usize,

    /// Buffered computation events per subscriber. Default: 64
    pub event_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            data_dir: infrastructure::default_data_dir(),
            trace_level: None,
            max_posterior_samples: 1000,
            histogram_bins: 60,
            event_capacity: 64,
        }
    }
}

impl Config {
    /// Parses configuration from a string map, e.g. command-line `key=value` pairs.
    ///
    /// Unknown keys are ignored. Values that fail to parse fall back to their
    /// default.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::collections::BTreeMap;
    /// use molonari::Config;
    ///
    /// let mut map = BTreeMap::new();
    /// map.insert("histogram_bins".to_string(), "30".to_string());
    /// map.insert("max_posterior_samples".to_string(), "many".to_string());
    ///
    /// let config = Config::from_map(&map);
    /// assert_eq!(config.histogram_bins, 30);
    /// assert_eq!(config.max_posterior_samples, 1000);
    /// ```
    #[must_use]
    pub fn from_map(map: &BTreeMap<String, String>) -> Self {
        let defaults = Self::default();
        let number = |key: &str, default: usize| {
            map.get(key)
                .and_then(|s| s.trim().parse::<usize>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(default)
        };
        let text = |key: &str| {
            map.get(key)
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(String::from)
        };

        Self {
            database_path: text("database_path").map(PathBuf::from),
            data_dir: text("data_dir").map_or(defaults.data_dir, PathBuf::from),
            trace_level: text("trace_level"),
            max_posterior_samples: number("max_posterior_samples", defaults.max_posterior_samples),
            histogram_bins: number("histogram_bins", defaults.histogram_bins),
            event_capacity: number("event_capacity", defaults.event_capacity),
        }
    }

    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`MolonariError::Config`] if the document is malformed or a
    /// value has the wrong type.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| MolonariError::Config(e.to_string()))
    }

    /// Reads a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`MolonariError::Io`] if the file cannot be read, or
    /// [`MolonariError::Config`] if it does not parse.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Database file with a leading `~` expanded.
    #[must_use]
    pub fn resolved_database_path(&self) -> Option<PathBuf> {
        let home = std::env::var("HOME").ok();
        self.database_path.as_ref().map(|path| {
            PathBuf::from(infrastructure::expand_tilde(
                &path.to_string_lossy(),
                home.as_deref(),
            ))
        })
    }

    /// Opens the configured store.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_store(&self) -> Result<SqliteStore> {
        match self.resolved_database_path() {
            Some(path) => SqliteStore::open(path),
            None => SqliteStore::open_in_memory(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_overrides_only_listed_fields() {
        let config = Config::from_toml_str(
            r#"
            database_path = "/srv/molonari/site.sqlite"
            histogram_bins = 25
            "#,
        )
        .unwrap();

        assert_eq!(
            config.database_path,
            Some(PathBuf::from("/srv/molonari/site.sqlite"))
        );
        assert_eq!(config.histogram_bins, 25);
        assert_eq!(config.max_posterior_samples, 1000);
        assert_eq!(config.event_capacity, 64);
    }

    #[test]
    fn test_toml_type_error_is_config_error() {
        let err = Config::from_toml_str("histogram_bins = \"many\"").unwrap_err();
        assert!(matches!(err, MolonariError::Config(_)));
    }

    #[test]
    fn test_from_map_ignores_empty_and_zero() {
        let map: BTreeMap<String, String> = [
            ("database_path", " "),
            ("event_capacity", "0"),
            ("trace_level", "debug"),
            ("data_dir", "/tmp/molonari"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config = Config::from_map(&map);
        assert_eq!(config.database_path, None);
        assert_eq!(config.event_capacity, 64);
        assert_eq!(config.trace_level.as_deref(), Some("debug"));
        assert_eq!(config.data_dir, PathBuf::from("/tmp/molonari"));
    }

    #[test]
    fn test_load_and_open_file_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("molonari.toml");
        let database = dir.path().join("db").join("site.sqlite");
        std::fs::write(
            &file,
            format!("database_path = {:?}\n", database.to_string_lossy()),
        )
        .unwrap();

        let config = Config::load(&file).unwrap();
        config.open_store().unwrap();
        assert!(database.exists());
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = Config::load("/nonexistent/molonari.toml").unwrap_err();
        assert!(matches!(err, MolonariError::Io(_)));
    }
}
