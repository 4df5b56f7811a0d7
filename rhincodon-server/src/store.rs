//! PostgreSQL Persistence
//!
//! One pool, two tables: `telemetry` (one row per canonical reading,
//! flattened columns) and `alerts` (one row per threshold violation).
//! The pool is created lazily so the relay can come up before the
//! database does; schema bootstrap doubles as the connectivity probe
//! and is retried by the composition root until it succeeds.
//!
//! Queries are bound at runtime; no compile-time database access.

use crate::ingest::{SinkError, TelemetrySink};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rhincodon_core::{AlertEvent, CanonicalReading};
use serde::Serialize;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::debug;

/// One persisted reading, as served by the query endpoints
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ReadingRow {
    pub id: i64,
    pub device_id: String,
    pub speed_cms: f64,
    pub temperature: f64,
    pub dissolved_oxygen: f64,
    pub pressure: f64,
    pub depth: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub accel_x: f64,
    pub accel_y: f64,
    pub accel_z: f64,
    pub gyro_x: f64,
    pub gyro_y: f64,
    pub gyro_z: f64,
    pub satellites: i32,
    pub quality: i32,
    pub pump_state: bool,
    pub created_at: DateTime<Utc>,
}

/// Aggregates over a trailing time window
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StatisticsRow {
    pub avg_speed: Option<f64>,
    pub max_speed: Option<f64>,
    pub min_speed: Option<f64>,
    pub avg_temp: Option<f64>,
    pub avg_do: Option<f64>,
    pub avg_depth: Option<f64>,
    pub data_points: i64,
}

const CREATE_TELEMETRY: &str = "
    CREATE TABLE IF NOT EXISTS telemetry (
        id BIGSERIAL PRIMARY KEY,
        device_id VARCHAR(50) NOT NULL,
        speed_cms DOUBLE PRECISION NOT NULL,
        temperature DOUBLE PRECISION NOT NULL,
        dissolved_oxygen DOUBLE PRECISION NOT NULL,
        pressure DOUBLE PRECISION NOT NULL,
        depth DOUBLE PRECISION NOT NULL,
        latitude DOUBLE PRECISION NOT NULL,
        longitude DOUBLE PRECISION NOT NULL,
        accel_x DOUBLE PRECISION NOT NULL,
        accel_y DOUBLE PRECISION NOT NULL,
        accel_z DOUBLE PRECISION NOT NULL,
        gyro_x DOUBLE PRECISION NOT NULL,
        gyro_y DOUBLE PRECISION NOT NULL,
        gyro_z DOUBLE PRECISION NOT NULL,
        satellites INTEGER NOT NULL,
        quality INTEGER NOT NULL,
        pump_state BOOLEAN NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )";

const CREATE_ALERTS: &str = "
    CREATE TABLE IF NOT EXISTS alerts (
        id BIGSERIAL PRIMARY KEY,
        device_id VARCHAR(50) NOT NULL,
        kind VARCHAR(20) NOT NULL,
        level VARCHAR(10) NOT NULL,
        message TEXT NOT NULL,
        value DOUBLE PRECISION NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )";

/// Handle to the relational store
pub struct Store {
    pool: PgPool,
}

impl Store {
    /// Create a lazily-connecting pool. Fails only on an unparsable
    /// URL; the first real connection happens on first use.
    pub fn connect_lazy(url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new().max_connections(5).connect_lazy(url)?;
        Ok(Self { pool })
    }

    /// Create both tables if missing. Also serves as the connectivity
    /// probe at startup.
    pub async fn init_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(CREATE_TELEMETRY).execute(&self.pool).await?;
        sqlx::query(CREATE_ALERTS).execute(&self.pool).await?;
        Ok(())
    }

    /// Insert one reading, returning its row id
    pub async fn insert_reading(&self, reading: &CanonicalReading) -> Result<i64, sqlx::Error> {
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO telemetry (
                device_id, speed_cms, temperature, dissolved_oxygen, pressure, depth,
                latitude, longitude, accel_x, accel_y, accel_z, gyro_x, gyro_y, gyro_z,
                satellites, quality, pump_state
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING id",
        )
        .bind(&reading.device_id)
        .bind(reading.speed_cms)
        .bind(reading.temperature)
        .bind(reading.dissolved_oxygen)
        .bind(reading.pressure)
        .bind(reading.depth)
        .bind(reading.location.lat)
        .bind(reading.location.lon)
        .bind(reading.acceleration.x)
        .bind(reading.acceleration.y)
        .bind(reading.acceleration.z)
        .bind(reading.gyroscope.x)
        .bind(reading.gyroscope.y)
        .bind(reading.gyroscope.z)
        .bind(reading.location.satellites as i32)
        .bind(reading.quality as i32)
        .bind(reading.pump_state)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    /// Insert one row per alert
    pub async fn insert_alerts(
        &self,
        device_id: &str,
        alerts: &[AlertEvent],
    ) -> Result<(), sqlx::Error> {
        for alert in alerts {
            sqlx::query(
                "INSERT INTO alerts (device_id, kind, level, message, value)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(device_id)
            .bind(alert.kind.name())
            .bind(alert.severity.name())
            .bind(&alert.message)
            .bind(alert.value)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Most recent reading, if any
    pub async fn latest(&self) -> Result<Option<ReadingRow>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM telemetry ORDER BY created_at DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await
    }

    /// Paginated history, newest first
    pub async fn history(
        &self,
        limit: i64,
        offset: i64,
        device_id: Option<&str>,
    ) -> Result<Vec<ReadingRow>, sqlx::Error> {
        match device_id {
            Some(device) => {
                sqlx::query_as(
                    "SELECT * FROM telemetry WHERE device_id = $3
                     ORDER BY created_at DESC LIMIT $1 OFFSET $2",
                )
                .bind(limit)
                .bind(offset)
                .bind(device)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as(
                    "SELECT * FROM telemetry ORDER BY created_at DESC LIMIT $1 OFFSET $2",
                )
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
            }
        }
    }

    /// The latest `limit` readings in chronological order, for history
    /// replies on the live channel
    pub async fn recent_history(
        &self,
        limit: i64,
        device_id: Option<&str>,
    ) -> Result<Vec<ReadingRow>, sqlx::Error> {
        let mut rows = self.history(limit, 0, device_id).await?;
        rows.reverse();
        Ok(rows)
    }

    /// Aggregates over the trailing `hours` window, optionally filtered
    /// by device. The window is bound as a parameter, not interpolated.
    pub async fn statistics(
        &self,
        hours: f64,
        device_id: Option<&str>,
    ) -> Result<StatisticsRow, sqlx::Error> {
        match device_id {
            Some(device) => {
                sqlx::query_as(
                    "SELECT
                        AVG(speed_cms) AS avg_speed,
                        MAX(speed_cms) AS max_speed,
                        MIN(speed_cms) AS min_speed,
                        AVG(temperature) AS avg_temp,
                        AVG(dissolved_oxygen) AS avg_do,
                        AVG(depth) AS avg_depth,
                        COUNT(*) AS data_points
                     FROM telemetry
                     WHERE created_at > now() - interval '1 hour' * $1
                       AND device_id = $2",
                )
                .bind(hours)
                .bind(device)
                .fetch_one(&self.pool)
                .await
            }
            None => {
                sqlx::query_as(
                    "SELECT
                        AVG(speed_cms) AS avg_speed,
                        MAX(speed_cms) AS max_speed,
                        MIN(speed_cms) AS min_speed,
                        AVG(temperature) AS avg_temp,
                        AVG(dissolved_oxygen) AS avg_do,
                        AVG(depth) AS avg_depth,
                        COUNT(*) AS data_points
                     FROM telemetry
                     WHERE created_at > now() - interval '1 hour' * $1",
                )
                .bind(hours)
                .fetch_one(&self.pool)
                .await
            }
        }
    }
}

#[async_trait]
impl TelemetrySink for Store {
    async fn store_reading(&self, reading: &CanonicalReading) -> Result<(), SinkError> {
        let id = self
            .insert_reading(reading)
            .await
            .map_err(|e| SinkError::new(e.to_string()))?;
        debug!("reading saved with id {id}");
        Ok(())
    }

    async fn store_alerts(
        &self,
        device_id: &str,
        alerts: &[AlertEvent],
    ) -> Result<(), SinkError> {
        self.insert_alerts(device_id, alerts)
            .await
            .map_err(|e| SinkError::new(e.to_string()))
    }
}
