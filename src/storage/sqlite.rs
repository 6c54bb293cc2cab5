//! SQLite implementation of [`ResultsStore`].
//!
//! Every mutating operation runs inside one transaction. Date and depth rows
//! are resolved with a lookup-or-create on every write, so repeated quantile
//! commits never duplicate them.

use crate::domain::error::{MolonariError, Result};
use crate::domain::measures::{format_date, parse_date};
use crate::domain::{
    CleanedMeasure, LayerParameters, PointId, PointSetup, Quantile, RawMeasure, ResultKind,
    StoreCounts,
};
use crate::storage::backend::ResultsStore;
use crate::storage::models::{
    DepthTimeGrid, Generation, GenerationCounts, LayerRecord, PointRecord, QuantileGrids,
    RmseRecord,
};
use crate::storage::schema;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::Path;

/// SQLite-backed results store.
///
/// # Examples
///
/// ```
/// use molonari::storage::{ResultsStore, SqliteStore};
/// use molonari::{ComputationState, PointSetup};
///
/// let mut store = SqliteStore::open_in_memory()?;
/// let setup = PointSetup {
///     river_bed: 1.0,
///     offset: 0.0,
///     sensor_depths: [0.1, 0.2, 0.3, 0.4],
///     sigma_pressure: 0.01,
///     sigma_temperature: 0.1,
/// };
/// let point = store.register_point("P034", &setup)?;
/// assert_eq!(store.computation_state(point)?, ComputationState::NoData);
/// # Ok::<(), molonari::MolonariError>(())
/// ```
pub struct SqliteStore {
    pub(crate) conn: Connection,
}

impl SqliteStore {
    /// Opens (or creates) a store file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or database cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        tracing::debug!(path = %path.display(), "opening results store");
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::with_connection(conn)
    }

    /// Opens a private in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be applied.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(schema::create_schema())?;
        Ok(Self { conn })
    }
}

// ───────────────────── Row helpers ─────────────────────

/// Reads a `DATE_FORMAT` text column.
pub(crate) fn date_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let text: String = row.get(idx)?;
    parse_date(&text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Reads four consecutive parameter columns.
pub(crate) fn parameter_columns(
    row: &rusqlite::Row<'_>,
    first: usize,
) -> rusqlite::Result<LayerParameters> {
    Ok(LayerParameters {
        permeability: row.get(first)?,
        thermal_conductivity: row.get(first + 1)?,
        porosity: row.get(first + 2)?,
        heat_capacity: row.get(first + 3)?,
    })
}

pub(crate) fn to_usize(value: i64) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| MolonariError::StoreInconsistency(format!("negative count {value}")))
}

fn to_i64(value: usize) -> Result<i64> {
    i64::try_from(value)
        .map_err(|_| MolonariError::Validation(format!("{value} does not fit the store")))
}

fn count(conn: &Connection, sql: &str, point: PointId) -> Result<usize> {
    let value: i64 = conn.query_row(sql, [point.0], |row| row.get(0))?;
    to_usize(value)
}

fn ensure_point(conn: &Connection, point: PointId) -> Result<()> {
    conn.query_row("SELECT 1 FROM point WHERE id = ?1", [point.0], |_| Ok(()))
        .optional()?
        .ok_or(MolonariError::UnknownPoint(point))
}

/// Fails with `GenerationDiscarded` unless the generation is still pending.
fn ensure_pending(conn: &Connection, generation: Generation) -> Result<()> {
    let owner: Option<i64> = conn
        .query_row(
            "SELECT point_id FROM generation WHERE id = ?1 AND status = 'pending'",
            [generation.id],
            |row| row.get(0),
        )
        .optional()?;

    match owner {
        Some(point) if point == generation.point.0 => Ok(()),
        _ => {
            tracing::debug!(
                point = %generation.point,
                generation = generation.id,
                "generation no longer pending"
            );
            Err(MolonariError::GenerationDiscarded {
                point: generation.point,
            })
        }
    }
}

fn date_id(conn: &Connection, point: PointId, date: &NaiveDateTime) -> Result<i64> {
    let text = format_date(date);
    conn.prepare_cached("INSERT OR IGNORE INTO date_node (point_id, date) VALUES (?1, ?2)")?
        .execute(params![point.0, text])?;
    let id = conn
        .prepare_cached("SELECT id FROM date_node WHERE point_id = ?1 AND date = ?2")?
        .query_row(params![point.0, text], |row| row.get(0))?;
    Ok(id)
}

fn depth_id(conn: &Connection, point: PointId, depth: f64) -> Result<i64> {
    conn.prepare_cached("INSERT OR IGNORE INTO depth_node (point_id, depth) VALUES (?1, ?2)")?
        .execute(params![point.0, depth])?;
    let id = conn
        .prepare_cached("SELECT id FROM depth_node WHERE point_id = ?1 AND depth = ?2")?
        .query_row(params![point.0, depth], |row| row.get(0))?;
    Ok(id)
}

fn quantile_id(conn: &Connection, generation: Generation, quantile: Quantile) -> Result<Option<i64>> {
    Ok(conn
        .query_row(
            "SELECT id FROM quantile WHERE generation_id = ?1 AND value = ?2",
            params![generation.id, quantile.value()],
            |row| row.get(0),
        )
        .optional()?)
}

/// Removes every generation row of a point in dependency order.
///
/// Date rows still referenced by cleaned measures survive. Returns `true` if
/// anything was deleted.
fn delete_generation_rows(conn: &Connection, point: PointId) -> Result<bool> {
    const STEPS: [&str; 10] = [
        "DELETE FROM result_record WHERE quantile_id IN (SELECT id FROM quantile WHERE point_id = ?1)",
        "DELETE FROM water_flow WHERE quantile_id IN (SELECT id FROM quantile WHERE point_id = ?1)",
        "DELETE FROM rmse WHERE quantile_id IN (SELECT id FROM quantile WHERE point_id = ?1)",
        "DELETE FROM parameter_sample WHERE layer_id IN (SELECT id FROM layer WHERE point_id = ?1)",
        "DELETE FROM best_parameters WHERE layer_id IN (SELECT id FROM layer WHERE point_id = ?1)",
        "DELETE FROM layer WHERE point_id = ?1",
        "DELETE FROM quantile WHERE point_id = ?1",
        "DELETE FROM depth_node WHERE point_id = ?1",
        "DELETE FROM date_node WHERE point_id = ?1
            AND id NOT IN (SELECT date_id FROM cleaned_measure WHERE point_id = ?1)",
        "DELETE FROM generation WHERE point_id = ?1",
    ];

    let mut removed = 0;
    for sql in STEPS {
        removed += conn.execute(sql, [point.0])?;
    }
    conn.execute("UPDATE point SET cell_count = NULL WHERE id = ?1", [point.0])?;

    Ok(removed > 0)
}

fn delete_cleaned_rows(conn: &Connection, point: PointId) -> Result<usize> {
    delete_generation_rows(conn, point)?;
    let removed = conn.execute("DELETE FROM cleaned_measure WHERE point_id = ?1", [point.0])?;
    conn.execute("DELETE FROM date_node WHERE point_id = ?1", [point.0])?;
    Ok(removed)
}

fn check_grid_shape(grids: &QuantileGrids) -> Result<()> {
    let times = grids.dates.len();
    let depths = grids.depths.len();
    let grid_ok = |grid: &Vec<Vec<f64>>| grid.len() == times && grid.iter().all(|row| row.len() == depths);

    if grid_ok(&grids.temperature)
        && grid_ok(&grids.advective_flow)
        && grid_ok(&grids.conductive_flow)
        && grids.water_flux.len() == times
    {
        Ok(())
    } else {
        Err(MolonariError::Validation(format!(
            "quantile {} grids do not match {times} dates x {depths} depths",
            grids.quantile
        )))
    }
}

impl ResultsStore for SqliteStore {
    fn register_point(&mut self, name: &str, setup: &PointSetup) -> Result<PointId> {
        let _span = tracing::debug_span!("register_point", name = %name).entered();

        if let Some(existing) = self.find_point(name)? {
            tracing::debug!(point = %existing.id, "point already registered");
            return Ok(existing.id);
        }

        setup.validate()?;
        self.conn.execute(
            "INSERT INTO point (name, river_bed, sensor_offset, depth1, depth2, depth3, depth4,
                                sigma_pressure, sigma_temperature)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                name,
                setup.river_bed,
                setup.offset,
                setup.sensor_depths[0],
                setup.sensor_depths[1],
                setup.sensor_depths[2],
                setup.sensor_depths[3],
                setup.sigma_pressure,
                setup.sigma_temperature,
            ],
        )?;

        let id = PointId(self.conn.last_insert_rowid());
        tracing::info!(point = %id, name = %name, "point registered");
        Ok(id)
    }

    fn point(&self, point: PointId) -> Result<PointRecord> {
        self.query_point("WHERE id = ?1", params![point.0])?
            .ok_or(MolonariError::UnknownPoint(point))
    }

    fn find_point(&self, name: &str) -> Result<Option<PointRecord>> {
        self.query_point("WHERE name = ?1", params![name])
    }

    fn delete_point(&mut self, point: PointId) -> Result<()> {
        let _span = tracing::debug_span!("delete_point", point = %point).entered();

        let tx = self.conn.transaction()?;
        delete_cleaned_rows(&tx, point)?;
        tx.execute("DELETE FROM raw_measure WHERE point_id = ?1", [point.0])?;
        tx.execute("DELETE FROM point WHERE id = ?1", [point.0])?;
        tx.commit()?;

        tracing::info!(point = %point, "point deleted");
        Ok(())
    }

    fn insert_raw_measures(&mut self, point: PointId, measures: &[RawMeasure]) -> Result<usize> {
        let _span = tracing::debug_span!("insert_raw_measures", point = %point).entered();
        ensure_point(&self.conn, point)?;

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO raw_measure (point_id, date, temp1, temp2, temp3, temp4,
                                          bed_temperature, voltage)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for row in measures {
                stmt.execute(params![
                    point.0,
                    format_date(&row.timestamp),
                    row.temperatures[0],
                    row.temperatures[1],
                    row.temperatures[2],
                    row.temperatures[3],
                    row.bed_temperature,
                    row.voltage,
                ])?;
            }
        }
        tx.commit()?;

        tracing::debug!(rows = measures.len(), "raw measures inserted");
        Ok(measures.len())
    }

    fn raw_measures(&self, point: PointId) -> Result<Vec<RawMeasure>> {
        let mut stmt = self.conn.prepare(
            "SELECT date, temp1, temp2, temp3, temp4, bed_temperature, voltage
             FROM raw_measure
             WHERE point_id = ?1
             ORDER BY date, id",
        )?;
        let rows = stmt
            .query_map([point.0], |row| {
                Ok(RawMeasure {
                    timestamp: date_column(row, 0)?,
                    temperatures: [row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?],
                    bed_temperature: row.get(5)?,
                    voltage: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn delete_raw_measures(&mut self, point: PointId) -> Result<()> {
        let _span = tracing::debug_span!("delete_raw_measures", point = %point).entered();

        let tx = self.conn.transaction()?;
        delete_cleaned_rows(&tx, point)?;
        let removed = tx.execute("DELETE FROM raw_measure WHERE point_id = ?1", [point.0])?;
        tx.commit()?;

        tracing::info!(point = %point, rows = removed, "raw measures deleted");
        Ok(())
    }

    fn replace_cleaned_measures(
        &mut self,
        point: PointId,
        measures: &[CleanedMeasure],
    ) -> Result<usize> {
        let _span = tracing::debug_span!("replace_cleaned_measures", point = %point).entered();
        ensure_point(&self.conn, point)?;

        let mut seen = HashSet::new();
        if let Some(row) = measures
            .iter()
            .filter(|row| row.is_complete())
            .find(|row| !seen.insert(row.timestamp))
        {
            return Err(MolonariError::Validation(format!(
                "cleaned measures repeat the timestamp {}",
                format_date(&row.timestamp)
            )));
        }

        let tx = self.conn.transaction()?;
        delete_cleaned_rows(&tx, point)?;

        let mut kept = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO cleaned_measure (point_id, date_id, temp1, temp2, temp3, temp4,
                                              bed_temperature, pressure)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for row in measures.iter().filter(|row| row.is_complete()) {
                let date = date_id(&tx, point, &row.timestamp)?;
                stmt.execute(params![
                    point.0,
                    date,
                    row.temperatures[0],
                    row.temperatures[1],
                    row.temperatures[2],
                    row.temperatures[3],
                    row.bed_temperature,
                    row.pressure,
                ])?;
                kept += 1;
            }
        }
        tx.commit()?;

        tracing::info!(
            point = %point,
            kept = kept,
            skipped = measures.len() - kept,
            "cleaned measures replaced"
        );
        Ok(kept)
    }

    fn cleaned_measures(&self, point: PointId) -> Result<Vec<CleanedMeasure>> {
        let mut stmt = self.conn.prepare(
            "SELECT d.date, c.temp1, c.temp2, c.temp3, c.temp4, c.bed_temperature, c.pressure
             FROM cleaned_measure c
             JOIN date_node d ON d.id = c.date_id
             WHERE c.point_id = ?1
             ORDER BY d.date, c.id",
        )?;
        let rows = stmt
            .query_map([point.0], |row| {
                Ok(CleanedMeasure {
                    timestamp: date_column(row, 0)?,
                    temperatures: [row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?],
                    bed_temperature: row.get(5)?,
                    pressure: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn delete_cleaned_measures(&mut self, point: PointId) -> Result<()> {
        let _span = tracing::debug_span!("delete_cleaned_measures", point = %point).entered();

        let tx = self.conn.transaction()?;
        let removed = delete_cleaned_rows(&tx, point)?;
        tx.commit()?;

        tracing::info!(point = %point, rows = removed, "cleaned measures deleted");
        Ok(())
    }

    fn counts(&self, point: PointId) -> Result<StoreCounts> {
        ensure_point(&self.conn, point)?;

        let cleaned_revision: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(id), 0) FROM cleaned_measure WHERE point_id = ?1",
            [point.0],
            |row| row.get(0),
        )?;
        let generation = self
            .conn
            .query_row(
                "SELECT id FROM generation WHERE point_id = ?1",
                [point.0],
                |row| row.get(0),
            )
            .optional()?;

        Ok(StoreCounts {
            raw: count(&self.conn, "SELECT COUNT(*) FROM raw_measure WHERE point_id = ?1", point)?,
            cleaned: count(
                &self.conn,
                "SELECT COUNT(*) FROM cleaned_measure WHERE point_id = ?1",
                point,
            )?,
            cleaned_revision,
            quantiles: count(
                &self.conn,
                "SELECT COUNT(*) FROM quantile q
                 JOIN generation g ON g.id = q.generation_id
                 WHERE q.point_id = ?1 AND g.status = 'complete'",
                point,
            )?,
            generation,
        })
    }

    fn generation_counts(&self, point: PointId) -> Result<GenerationCounts> {
        let conn = &self.conn;
        Ok(GenerationCounts {
            quantiles: count(conn, "SELECT COUNT(*) FROM quantile WHERE point_id = ?1", point)?,
            layers: count(conn, "SELECT COUNT(*) FROM layer WHERE point_id = ?1", point)?,
            depths: count(conn, "SELECT COUNT(*) FROM depth_node WHERE point_id = ?1", point)?,
            dates: count(conn, "SELECT COUNT(*) FROM date_node WHERE point_id = ?1", point)?,
            results: count(
                conn,
                "SELECT COUNT(*) FROM result_record
                 WHERE quantile_id IN (SELECT id FROM quantile WHERE point_id = ?1)",
                point,
            )?,
            water_flows: count(
                conn,
                "SELECT COUNT(*) FROM water_flow
                 WHERE quantile_id IN (SELECT id FROM quantile WHERE point_id = ?1)",
                point,
            )?,
            rmse: count(
                conn,
                "SELECT COUNT(*) FROM rmse
                 WHERE quantile_id IN (SELECT id FROM quantile WHERE point_id = ?1)",
                point,
            )?,
            samples: count(
                conn,
                "SELECT COUNT(*) FROM parameter_sample
                 WHERE layer_id IN (SELECT id FROM layer WHERE point_id = ?1)",
                point,
            )?,
        })
    }

    fn begin_generation(&mut self, point: PointId, cell_count: usize) -> Result<Generation> {
        let _span = tracing::debug_span!("begin_generation", point = %point).entered();
        ensure_point(&self.conn, point)?;

        let tx = self.conn.transaction()?;
        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM generation WHERE point_id = ?1",
                [point.0],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(existing) = existing {
            return Err(MolonariError::Validation(format!(
                "point {point} still holds generation {existing}; delete it before computing again"
            )));
        }

        tx.execute(
            "INSERT INTO generation (point_id, status, started_at) VALUES (?1, 'pending', ?2)",
            params![point.0, chrono::Utc::now().to_rfc3339()],
        )?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "UPDATE point SET cell_count = ?1 WHERE id = ?2",
            params![to_i64(cell_count)?, point.0],
        )?;
        tx.commit()?;

        tracing::debug!(generation = id, cell_count = cell_count, "generation opened");
        Ok(Generation { id, point })
    }

    fn commit_layers(&mut self, generation: Generation, layers: &[LayerRecord]) -> Result<()> {
        let _span = tracing::debug_span!("commit_layers", point = %generation.point).entered();

        let tx = self.conn.transaction()?;
        ensure_pending(&tx, generation)?;
        for layer in layers {
            tx.execute(
                "INSERT INTO layer (generation_id, point_id, ordinal, depth_bed)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    generation.id,
                    generation.point.0,
                    to_i64(layer.ordinal)?,
                    layer.depth_bed
                ],
            )?;
            let layer_id = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO best_parameters (layer_id, permeability, thermal_conductivity,
                                              porosity, heat_capacity)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    layer_id,
                    layer.best.permeability,
                    layer.best.thermal_conductivity,
                    layer.best.porosity,
                    layer.best.heat_capacity,
                ],
            )?;
        }
        tx.commit()?;

        tracing::debug!(layers = layers.len(), "layers committed");
        Ok(())
    }

    fn commit_quantile(&mut self, generation: Generation, grids: &QuantileGrids) -> Result<()> {
        let _span = tracing::debug_span!(
            "commit_quantile",
            point = %generation.point,
            quantile = %grids.quantile
        )
        .entered();
        check_grid_shape(grids)?;

        let point = generation.point;
        let tx = self.conn.transaction()?;
        ensure_pending(&tx, generation)?;

        let layers: i64 = tx.query_row(
            "SELECT COUNT(*) FROM layer WHERE generation_id = ?1",
            [generation.id],
            |row| row.get(0),
        )?;
        if layers == 0 {
            return Err(MolonariError::StoreInconsistency(format!(
                "quantile {} committed before the layers of generation {}",
                grids.quantile, generation.id
            )));
        }
        if !grids.quantile.is_best() && quantile_id(&tx, generation, Quantile::BEST)?.is_none() {
            return Err(MolonariError::StoreInconsistency(format!(
                "quantile {} committed before quantile 0",
                grids.quantile
            )));
        }

        tx.execute(
            "INSERT INTO quantile (generation_id, point_id, value) VALUES (?1, ?2, ?3)",
            params![generation.id, point.0, grids.quantile.value()],
        )?;
        let quantile = tx.last_insert_rowid();

        let depth_ids = grids
            .depths
            .iter()
            .map(|depth| depth_id(&tx, point, *depth))
            .collect::<Result<Vec<_>>>()?;
        let date_ids = grids
            .dates
            .iter()
            .map(|date| date_id(&tx, point, date))
            .collect::<Result<Vec<_>>>()?;

        {
            let mut record = tx.prepare(
                "INSERT INTO result_record (quantile_id, date_id, depth_id, temperature,
                                            advective_flow, conductive_flow, total_flow)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for (t, date) in date_ids.iter().enumerate() {
                for (d, depth) in depth_ids.iter().enumerate() {
                    let advective = grids.advective_flow[t][d];
                    let conductive = grids.conductive_flow[t][d];
                    record.execute(params![
                        quantile,
                        date,
                        depth,
                        grids.temperature[t][d],
                        advective,
                        conductive,
                        advective + conductive,
                    ])?;
                }
            }

            let mut flow = tx.prepare(
                "INSERT INTO water_flow (quantile_id, date_id, flux) VALUES (?1, ?2, ?3)",
            )?;
            for (date, flux) in date_ids.iter().zip(&grids.water_flux) {
                flow.execute(params![quantile, date, flux])?;
            }
        }
        tx.commit()?;

        tracing::debug!(
            dates = date_ids.len(),
            depths = depth_ids.len(),
            "quantile committed"
        );
        Ok(())
    }

    fn commit_rmse(&mut self, generation: Generation, records: &[RmseRecord]) -> Result<()> {
        let _span = tracing::debug_span!("commit_rmse", point = %generation.point).entered();

        let tx = self.conn.transaction()?;
        ensure_pending(&tx, generation)?;
        for record in records {
            let quantile = quantile_id(&tx, generation, record.quantile)?.ok_or_else(|| {
                MolonariError::StoreInconsistency(format!(
                    "RMSE for quantile {} which was never committed",
                    record.quantile
                ))
            })?;
            let depths = record
                .thermometer_depths
                .iter()
                .map(|depth| depth_id(&tx, generation.point, *depth))
                .collect::<Result<Vec<_>>>()?;

            tx.execute(
                "INSERT INTO rmse (quantile_id, depth1_id, depth2_id, depth3_id,
                                   rmse1, rmse2, rmse3, rmse_total)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    quantile,
                    depths[0],
                    depths[1],
                    depths[2],
                    record.per_thermometer[0],
                    record.per_thermometer[1],
                    record.per_thermometer[2],
                    record.total,
                ],
            )?;
        }
        tx.commit()?;

        tracing::debug!(records = records.len(), "rmse committed");
        Ok(())
    }

    fn commit_samples(
        &mut self,
        generation: Generation,
        samples: &[Vec<LayerParameters>],
    ) -> Result<()> {
        let _span = tracing::debug_span!("commit_samples", point = %generation.point).entered();

        let tx = self.conn.transaction()?;
        ensure_pending(&tx, generation)?;

        let layer_ids = {
            let mut stmt =
                tx.prepare("SELECT id FROM layer WHERE generation_id = ?1 ORDER BY ordinal")?;
            let ids = stmt
                .query_map([generation.id], |row| row.get::<_, i64>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            ids
        };
        if layer_ids.len() != samples.len() {
            return Err(MolonariError::Validation(format!(
                "{} sample sets for {} layers",
                samples.len(),
                layer_ids.len()
            )));
        }

        {
            let mut stmt = tx.prepare(
                "INSERT INTO parameter_sample (layer_id, ordinal, permeability,
                                               thermal_conductivity, porosity, heat_capacity)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (layer, layer_samples) in layer_ids.iter().zip(samples) {
                for (ordinal, sample) in layer_samples.iter().enumerate() {
                    stmt.execute(params![
                        layer,
                        to_i64(ordinal)?,
                        sample.permeability,
                        sample.thermal_conductivity,
                        sample.porosity,
                        sample.heat_capacity,
                    ])?;
                }
            }
        }
        tx.commit()?;

        tracing::debug!(
            samples = samples.iter().map(Vec::len).sum::<usize>(),
            "samples committed"
        );
        Ok(())
    }

    fn finish_generation(&mut self, generation: Generation) -> Result<()> {
        let tx = self.conn.transaction()?;
        ensure_pending(&tx, generation)?;
        tx.execute(
            "UPDATE generation SET status = 'complete' WHERE id = ?1",
            [generation.id],
        )?;
        tx.commit()?;

        tracing::info!(point = %generation.point, generation = generation.id, "generation complete");
        Ok(())
    }

    fn delete_generation(&mut self, point: PointId) -> Result<bool> {
        let _span = tracing::debug_span!("delete_generation", point = %point).entered();

        let tx = self.conn.transaction()?;
        let removed = delete_generation_rows(&tx, point)?;
        tx.commit()?;

        if removed {
            tracing::info!(point = %point, "generation deleted");
        } else {
            tracing::debug!(point = %point, "no generation to delete");
        }
        Ok(removed)
    }

    fn quantiles(&self, point: PointId) -> Result<Vec<Quantile>> {
        self.query_quantiles(point)
    }

    fn layers(&self, point: PointId) -> Result<Vec<LayerRecord>> {
        self.query_layers(point)
    }

    fn depths(&self, point: PointId) -> Result<Vec<f64>> {
        self.query_depths(point)
    }

    fn grid(
        &self,
        point: PointId,
        quantile: Quantile,
        kind: ResultKind,
    ) -> Result<DepthTimeGrid> {
        self.query_grid(point, quantile, kind)
    }

    fn water_flux(&self, point: PointId, quantile: Quantile) -> Result<Vec<(NaiveDateTime, f64)>> {
        self.query_water_flux(point, quantile)
    }

    fn rmse(&self, point: PointId) -> Result<Vec<RmseRecord>> {
        self.query_rmse(point)
    }

    fn samples(&self, point: PointId, layer_ordinal: usize) -> Result<Vec<LayerParameters>> {
        self.query_samples(point, layer_ordinal)
    }
}
