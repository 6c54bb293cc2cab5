//! Typed read queries over the completed generation of a point.
//!
//! Every query joins through `generation` and filters on `status = 'complete'`,
//! so a generation that is still being written never leaks into a read model.

use crate::domain::error::{MolonariError, Result};
use crate::domain::{LayerParameters, PointId, PointSetup, Quantile, ResultKind};
use crate::storage::models::{DepthTimeGrid, LayerRecord, PointRecord, RmseRecord};
use crate::storage::sqlite::{date_column, parameter_columns, to_usize, SqliteStore};
use chrono::NaiveDateTime;
use rusqlite::{params, OptionalExtension};

impl SqliteStore {
    pub(crate) fn query_point<P: rusqlite::Params>(
        &self,
        filter: &str,
        params: P,
    ) -> Result<Option<PointRecord>> {
        let sql = format!(
            "SELECT id, name, river_bed, sensor_offset, depth1, depth2, depth3, depth4,
                    sigma_pressure, sigma_temperature, cell_count
             FROM point {filter}"
        );
        let record = self
            .conn
            .query_row(&sql, params, |row| {
                Ok((
                    PointRecord {
                        id: PointId(row.get(0)?),
                        name: row.get(1)?,
                        setup: PointSetup {
                            river_bed: row.get(2)?,
                            offset: row.get(3)?,
                            sensor_depths: [row.get(4)?, row.get(5)?, row.get(6)?, row.get(7)?],
                            sigma_pressure: row.get(8)?,
                            sigma_temperature: row.get(9)?,
                        },
                        cell_count: None,
                    },
                    row.get::<_, Option<i64>>(10)?,
                ))
            })
            .optional()?;

        record
            .map(|(mut point, cells)| {
                point.cell_count = cells.map(to_usize).transpose()?;
                Ok(point)
            })
            .transpose()
    }

    pub(crate) fn query_quantiles(&self, point: PointId) -> Result<Vec<Quantile>> {
        let mut stmt = self.conn.prepare(
            "SELECT q.value
             FROM quantile q
             JOIN generation g ON g.id = q.generation_id
             WHERE q.point_id = ?1 AND g.status = 'complete'
             ORDER BY q.value",
        )?;
        let rows = stmt
            .query_map([point.0], |row| Ok(Quantile::from_stored(row.get(0)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub(crate) fn query_layers(&self, point: PointId) -> Result<Vec<LayerRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT l.ordinal, l.depth_bed, b.permeability, b.thermal_conductivity,
                    b.porosity, b.heat_capacity
             FROM layer l
             JOIN generation g ON g.id = l.generation_id
             JOIN best_parameters b ON b.layer_id = l.id
             WHERE l.point_id = ?1 AND g.status = 'complete'
             ORDER BY l.ordinal",
        )?;
        let rows = stmt
            .query_map([point.0], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, f64>(1)?,
                    parameter_columns(row, 2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(ordinal, depth_bed, best)| {
                Ok(LayerRecord {
                    ordinal: to_usize(ordinal)?,
                    depth_bed,
                    best,
                })
            })
            .collect()
    }

    pub(crate) fn query_depths(&self, point: PointId) -> Result<Vec<f64>> {
        let mut stmt = self.conn.prepare(
            "SELECT depth
             FROM depth_node
             WHERE point_id = ?1
               AND EXISTS (SELECT 1 FROM generation
                           WHERE point_id = ?1 AND status = 'complete')
             ORDER BY depth",
        )?;
        let rows = stmt
            .query_map([point.0], |row| row.get(0))?
            .collect::<std::result::Result<Vec<f64>, _>>()?;
        Ok(rows)
    }

    pub(crate) fn query_grid(
        &self,
        point: PointId,
        quantile: Quantile,
        kind: ResultKind,
    ) -> Result<DepthTimeGrid> {
        let column = match kind {
            ResultKind::Temperature => "r.temperature",
            ResultKind::AdvectiveFlow => "r.advective_flow",
            ResultKind::ConductiveFlow => "r.conductive_flow",
            ResultKind::TotalFlow => "r.total_flow",
            other => {
                return Err(MolonariError::Validation(format!(
                    "{other} is not stored as a depth-time grid"
                )))
            }
        };

        let sql = format!(
            "SELECT d.date, dp.depth, {column}
             FROM result_record r
             JOIN quantile q ON q.id = r.quantile_id
             JOIN generation g ON g.id = q.generation_id
             JOIN date_node d ON d.id = r.date_id
             JOIN depth_node dp ON dp.id = r.depth_id
             WHERE q.point_id = ?1 AND q.value = ?2 AND g.status = 'complete'
             ORDER BY d.date, dp.depth"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let cells = stmt
            .query_map(params![point.0, quantile.value()], |row| {
                Ok((date_column(row, 0)?, row.get::<_, f64>(1)?, row.get::<_, f64>(2)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut grid = DepthTimeGrid {
            quantile,
            dates: Vec::new(),
            depths: Vec::new(),
            values: Vec::new(),
        };
        for (date, depth, value) in cells {
            if grid.dates.last() != Some(&date) {
                grid.dates.push(date);
                grid.values.push(Vec::new());
            }
            if grid.dates.len() == 1 {
                grid.depths.push(depth);
            }
            if let Some(row) = grid.values.last_mut() {
                row.push(value);
            }
        }

        if grid.values.iter().any(|row| row.len() != grid.depths.len()) {
            return Err(MolonariError::StoreInconsistency(format!(
                "{kind} grid of quantile {quantile} is not rectangular"
            )));
        }
        Ok(grid)
    }

    pub(crate) fn query_water_flux(
        &self,
        point: PointId,
        quantile: Quantile,
    ) -> Result<Vec<(NaiveDateTime, f64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT d.date, w.flux
             FROM water_flow w
             JOIN quantile q ON q.id = w.quantile_id
             JOIN generation g ON g.id = q.generation_id
             JOIN date_node d ON d.id = w.date_id
             WHERE q.point_id = ?1 AND q.value = ?2 AND g.status = 'complete'
             ORDER BY d.date",
        )?;
        let rows = stmt
            .query_map(params![point.0, quantile.value()], |row| {
                Ok((date_column(row, 0)?, row.get(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub(crate) fn query_rmse(&self, point: PointId) -> Result<Vec<RmseRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT q.value, d1.depth, d2.depth, d3.depth,
                    r.rmse1, r.rmse2, r.rmse3, r.rmse_total
             FROM rmse r
             JOIN quantile q ON q.id = r.quantile_id
             JOIN generation g ON g.id = q.generation_id
             JOIN depth_node d1 ON d1.id = r.depth1_id
             JOIN depth_node d2 ON d2.id = r.depth2_id
             JOIN depth_node d3 ON d3.id = r.depth3_id
             WHERE q.point_id = ?1 AND g.status = 'complete'
             ORDER BY q.value",
        )?;
        let rows = stmt
            .query_map([point.0], |row| {
                Ok(RmseRecord {
                    quantile: Quantile::from_stored(row.get(0)?),
                    thermometer_depths: [row.get(1)?, row.get(2)?, row.get(3)?],
                    per_thermometer: [row.get(4)?, row.get(5)?, row.get(6)?],
                    total: row.get(7)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub(crate) fn query_samples(
        &self,
        point: PointId,
        layer_ordinal: usize,
    ) -> Result<Vec<LayerParameters>> {
        let ordinal = i64::try_from(layer_ordinal)
            .map_err(|_| MolonariError::Validation(format!("no layer {layer_ordinal}")))?;
        let mut stmt = self.conn.prepare(
            "SELECT s.permeability, s.thermal_conductivity, s.porosity, s.heat_capacity
             FROM parameter_sample s
             JOIN layer l ON l.id = s.layer_id
             JOIN generation g ON g.id = l.generation_id
             WHERE l.point_id = ?1 AND l.ordinal = ?2 AND g.status = 'complete'
             ORDER BY s.ordinal",
        )?;
        let rows = stmt
            .query_map(params![point.0, ordinal], |row| parameter_columns(row, 0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
