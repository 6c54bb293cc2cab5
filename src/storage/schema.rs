//! SQL schema of the results store.
//!
//! The schema is applied as a single batch when a store is opened.
//!
//! **Point tables:**
//! - `point` - Registered monitoring columns and their physical configuration
//! - `raw_measure` - Field rows before cleanup
//! - `date_node` - Deduplicated timestamps, shared by cleaned measures and results
//! - `cleaned_measure` - Cleaned rows, one per date
//!
//! **Generation tables:**
//! - `generation` - One row per computation, `pending` until fully written
//! - `layer`, `best_parameters`, `parameter_sample` - Layer split and parameters
//! - `quantile` - Statistical variants, `0` being the best fit
//! - `depth_node` - Deduplicated depths of the discretization
//! - `result_record` - Temperature and heat flows per (date, depth, quantile)
//! - `water_flow` - Interface water flux per (date, quantile)
//! - `rmse` - Fit quality per quantile

/// Returns the full SQL schema as a single batch string.
pub fn create_schema() -> &'static str {
    r"
    CREATE TABLE IF NOT EXISTS point (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        river_bed REAL NOT NULL,
        sensor_offset REAL NOT NULL,
        depth1 REAL NOT NULL,
        depth2 REAL NOT NULL,
        depth3 REAL NOT NULL,
        depth4 REAL NOT NULL,
        sigma_pressure REAL NOT NULL,
        sigma_temperature REAL NOT NULL,
        cell_count INTEGER
    );

    CREATE TABLE IF NOT EXISTS raw_measure (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        point_id INTEGER NOT NULL REFERENCES point(id),
        date TEXT NOT NULL,
        temp1 REAL,
        temp2 REAL,
        temp3 REAL,
        temp4 REAL,
        bed_temperature REAL,
        voltage REAL
    );
    CREATE INDEX IF NOT EXISTS idx_raw_point ON raw_measure(point_id, date);

    CREATE TABLE IF NOT EXISTS date_node (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        point_id INTEGER NOT NULL REFERENCES point(id),
        date TEXT NOT NULL,
        UNIQUE (point_id, date)
    );

    CREATE TABLE IF NOT EXISTS cleaned_measure (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        point_id INTEGER NOT NULL REFERENCES point(id),
        date_id INTEGER NOT NULL REFERENCES date_node(id),
        temp1 REAL NOT NULL,
        temp2 REAL NOT NULL,
        temp3 REAL NOT NULL,
        temp4 REAL NOT NULL,
        bed_temperature REAL NOT NULL,
        pressure REAL NOT NULL,
        UNIQUE (point_id, date_id)
    );
    CREATE INDEX IF NOT EXISTS idx_cleaned_point ON cleaned_measure(point_id);

    CREATE TABLE IF NOT EXISTS generation (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        point_id INTEGER NOT NULL UNIQUE REFERENCES point(id),
        status TEXT NOT NULL CHECK (status IN ('pending', 'complete')),
        started_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS layer (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        generation_id INTEGER NOT NULL REFERENCES generation(id),
        point_id INTEGER NOT NULL REFERENCES point(id),
        ordinal INTEGER NOT NULL,
        depth_bed REAL NOT NULL,
        UNIQUE (generation_id, ordinal)
    );

    CREATE TABLE IF NOT EXISTS best_parameters (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        layer_id INTEGER NOT NULL UNIQUE REFERENCES layer(id),
        permeability REAL NOT NULL,
        thermal_conductivity REAL NOT NULL,
        porosity REAL NOT NULL,
        heat_capacity REAL NOT NULL
    );

    CREATE TABLE IF NOT EXISTS parameter_sample (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        layer_id INTEGER NOT NULL REFERENCES layer(id),
        ordinal INTEGER NOT NULL,
        permeability REAL NOT NULL,
        thermal_conductivity REAL NOT NULL,
        porosity REAL NOT NULL,
        heat_capacity REAL NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_sample_layer ON parameter_sample(layer_id);

    CREATE TABLE IF NOT EXISTS quantile (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        generation_id INTEGER NOT NULL REFERENCES generation(id),
        point_id INTEGER NOT NULL REFERENCES point(id),
        value REAL NOT NULL,
        UNIQUE (point_id, value)
    );

    CREATE TABLE IF NOT EXISTS depth_node (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        point_id INTEGER NOT NULL REFERENCES point(id),
        depth REAL NOT NULL,
        UNIQUE (point_id, depth)
    );

    CREATE TABLE IF NOT EXISTS result_record (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        quantile_id INTEGER NOT NULL REFERENCES quantile(id),
        date_id INTEGER NOT NULL REFERENCES date_node(id),
        depth_id INTEGER NOT NULL REFERENCES depth_node(id),
        temperature REAL NOT NULL,
        advective_flow REAL NOT NULL,
        conductive_flow REAL NOT NULL,
        total_flow REAL NOT NULL,
        UNIQUE (quantile_id, date_id, depth_id)
    );

    CREATE TABLE IF NOT EXISTS water_flow (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        quantile_id INTEGER NOT NULL REFERENCES quantile(id),
        date_id INTEGER NOT NULL REFERENCES date_node(id),
        flux REAL NOT NULL,
        UNIQUE (quantile_id, date_id)
    );

    CREATE TABLE IF NOT EXISTS rmse (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        quantile_id INTEGER NOT NULL UNIQUE REFERENCES quantile(id),
        depth1_id INTEGER NOT NULL REFERENCES depth_node(id),
        depth2_id INTEGER NOT NULL REFERENCES depth_node(id),
        depth3_id INTEGER NOT NULL REFERENCES depth_node(id),
        rmse1 REAL NOT NULL,
        rmse2 REAL NOT NULL,
        rmse3 REAL NOT NULL,
        rmse_total REAL NOT NULL
    );
    "
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn schema_is_valid_sql() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(create_schema())
            .expect("Schema SQL should be valid");
    }

    #[test]
    fn schema_creates_all_tables() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(create_schema()).unwrap();

        let expected_tables = [
            "point",
            "raw_measure",
            "date_node",
            "cleaned_measure",
            "generation",
            "layer",
            "best_parameters",
            "parameter_sample",
            "quantile",
            "depth_node",
            "result_record",
            "water_flow",
            "rmse",
        ];

        for table in expected_tables {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "table {table} should exist");
        }
    }

    #[test]
    fn schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(create_schema()).unwrap();
        conn.execute_batch(create_schema())
            .expect("Re-applying the schema should be a no-op");
    }

    #[test]
    fn generation_status_is_constrained() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(create_schema()).unwrap();
        conn.execute(
            "INSERT INTO point (name, river_bed, sensor_offset, depth1, depth2, depth3, depth4,
                                sigma_pressure, sigma_temperature)
             VALUES ('p', 0, 0, 0.1, 0.2, 0.3, 0.4, 0, 0)",
            [],
        )
        .unwrap();

        let result = conn.execute(
            "INSERT INTO generation (point_id, status, started_at) VALUES (1, 'running', 'now')",
            [],
        );
        assert!(result.is_err());
    }
}
