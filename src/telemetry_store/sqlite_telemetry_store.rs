use super::models::{round2, JobStatistics, TelemetryStatistics};
use super::schema::TELEMETRY_VERSIONED_SCHEMAS;
use super::{TelemetryStore, VehicleDirectory};
use crate::sqlite_persistence::open_versioned;
use crate::telemetry::{
    EventType, IngestionStatus, JobExecutionLog, ReportType, Vehicle, VehicleTelemetry,
};
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

pub struct SqliteTelemetryStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTelemetryStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let is_new_db = !path.exists();

        let mut conn = Connection::open(path).context("Failed to open telemetry database")?;
        if is_new_db {
            info!("Creating new telemetry database at {:?}", path);
        }
        open_versioned(&mut conn, TELEMETRY_VERSIONED_SCHEMAS, is_new_db)
            .context("Failed to prepare telemetry database schema")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("Telemetry database lock poisoned"))
    }

    /// Fixed-width UTC timestamps so text comparison matches time order.
    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn parse_datetime(s: &str) -> rusqlite::Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    0,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })
    }

    fn insert_record(conn: &Connection, record: &VehicleTelemetry) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let json = serde_json::to_string(record).context("Failed to encode telemetry record")?;
        conn.execute(
            "INSERT INTO telemetry_records
                (id, vin, vehicle_name, report_type, event_type, provider_name, quality,
                 recorded_at, created_at, record)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                id,
                record.vin,
                record.vehicle_name,
                record.metadata.report_type.as_str(),
                record.event_type.as_str(),
                record.metadata.provider_name,
                record.metadata.quality.as_str(),
                Self::format_datetime(&record.recorded_at),
                Self::format_datetime(&record.created_at),
                json,
            ],
        )?;
        Ok(id)
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<VehicleTelemetry> {
        let json: String = row.get("record")?;
        serde_json::from_str(&json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
    }

    /// Run a record query with a fixed leading filter and an optional time window.
    fn query_records(
        &self,
        filter_column: &str,
        filter_value: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<VehicleTelemetry>> {
        let mut sql = format!("SELECT record FROM telemetry_records WHERE {} = ?", filter_column);
        let mut values = vec![SqlValue::Text(filter_value.to_string())];
        Self::push_window(&mut sql, &mut values, start, end);
        sql.push_str(" ORDER BY recorded_at DESC LIMIT ?");
        values.push(SqlValue::Integer(limit as i64));

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params_from_iter(values), Self::row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn push_window(
        sql: &mut String,
        values: &mut Vec<SqlValue>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) {
        if let Some(start) = start {
            sql.push_str(" AND recorded_at >= ?");
            values.push(SqlValue::Text(Self::format_datetime(&start)));
        }
        if let Some(end) = end {
            sql.push_str(" AND recorded_at <= ?");
            values.push(SqlValue::Text(Self::format_datetime(&end)));
        }
    }

    fn row_to_job_log(row: &rusqlite::Row) -> rusqlite::Result<JobExecutionLog> {
        let status_str: String = row.get("status")?;
        let start_time: String = row.get("start_time")?;
        let end_time: Option<String> = row.get("end_time")?;
        let error_summary: Option<String> = row.get("error_summary")?;
        let metadata: String = row.get("execution_metadata")?;

        Ok(JobExecutionLog {
            job_name: row.get("job_name")?,
            job_type: row.get("job_type")?,
            start_time: Self::parse_datetime(&start_time)?,
            end_time: end_time.map(|s| Self::parse_datetime(&s)).transpose()?,
            status: IngestionStatus::parse(&status_str).unwrap_or(IngestionStatus::Failed),
            vehicles_processed: row.get::<_, i64>("vehicles_processed")? as u64,
            vehicles_succeeded: row.get::<_, i64>("vehicles_succeeded")? as u64,
            vehicles_failed: row.get::<_, i64>("vehicles_failed")? as u64,
            error_summary: error_summary.and_then(|s| serde_json::from_str(&s).ok()),
            execution_metadata: serde_json::from_str(&metadata).unwrap_or_default(),
        })
    }

    fn job_log_columns(log: &JobExecutionLog) -> Result<(Option<String>, String)> {
        let error_summary = log
            .error_summary
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let metadata = serde_json::to_string(&log.execution_metadata)?;
        Ok((error_summary, metadata))
    }

    fn row_to_vehicle(row: &rusqlite::Row) -> rusqlite::Result<Vehicle> {
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;
        Ok(Vehicle {
            vin: row.get("vin")?,
            vehicle_name: row.get("vehicle_name")?,
            make: row.get("make")?,
            model: row.get("model")?,
            year: row.get("year")?,
            license_plate: row.get("license_plate")?,
            fleet_id: row.get("fleet_id")?,
            is_active: row.get::<_, i64>("is_active")? != 0,
            created_at: Self::parse_datetime(&created_at)?,
            updated_at: Self::parse_datetime(&updated_at)?,
        })
    }
}

impl TelemetryStore for SqliteTelemetryStore {
    fn insert_one(&self, record: &VehicleTelemetry) -> Result<String> {
        let conn = self.lock()?;
        Self::insert_record(&conn, record)
    }

    fn insert_many(&self, records: &[VehicleTelemetry]) -> Result<Vec<String>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let ids = records
            .iter()
            .map(|record| Self::insert_record(&tx, record))
            .collect::<Result<Vec<_>>>()?;
        tx.commit()?;
        debug!("Inserted {} telemetry records", ids.len());
        Ok(ids)
    }

    fn find_by_vin(
        &self,
        vin: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<VehicleTelemetry>> {
        self.query_records("vin", vin, start, end, limit)
    }

    fn find_by_event_type(
        &self,
        event_type: EventType,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<VehicleTelemetry>> {
        self.query_records("event_type", event_type.as_str(), start, end, limit)
    }

    fn latest_by_vin_and_report_type(
        &self,
        vin: &str,
        report_type: ReportType,
    ) -> Result<Option<VehicleTelemetry>> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                "SELECT record FROM telemetry_records
                 WHERE vin = ?1 AND report_type = ?2
                 ORDER BY recorded_at DESC LIMIT 1",
                params![vin, report_type.as_str()],
                Self::row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn statistics(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<TelemetryStatistics> {
        let mut filter = String::from(" WHERE 1 = 1");
        let mut values = Vec::new();
        Self::push_window(&mut filter, &mut values, start, end);

        let conn = self.lock()?;
        let (total, vehicles): (i64, i64) = conn.query_row(
            &format!(
                "SELECT COUNT(*), COUNT(DISTINCT vin) FROM telemetry_records{}",
                filter
            ),
            params_from_iter(values.iter()),
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let mut stats = TelemetryStatistics {
            total_records: total as u64,
            unique_vehicle_count: vehicles as u64,
            ..Default::default()
        };
        for (column, target) in [
            ("report_type", &mut stats.report_types),
            ("event_type", &mut stats.event_types),
        ] {
            let mut stmt = conn.prepare(&format!(
                "SELECT {col}, COUNT(*) FROM telemetry_records{} GROUP BY {col}",
                filter,
                col = column
            ))?;
            let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (key, count) = row?;
                target.insert(key, count as u64);
            }
        }
        Ok(stats)
    }

    fn delete_records_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM telemetry_records WHERE created_at < ?1",
            params![Self::format_datetime(&cutoff)],
        )?;
        Ok(deleted)
    }

    fn insert_job_log(&self, log: &JobExecutionLog) -> Result<i64> {
        let (error_summary, metadata) = Self::job_log_columns(log)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO job_execution_logs
                (job_name, job_type, start_time, end_time, status, vehicles_processed,
                 vehicles_succeeded, vehicles_failed, duration_seconds, success_rate,
                 error_summary, execution_metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                log.job_name,
                log.job_type,
                Self::format_datetime(&log.start_time),
                log.end_time.as_ref().map(Self::format_datetime),
                log.status.as_str(),
                log.vehicles_processed as i64,
                log.vehicles_succeeded as i64,
                log.vehicles_failed as i64,
                log.duration_seconds(),
                log.success_rate(),
                error_summary,
                metadata,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn update_job_log(&self, id: i64, log: &JobExecutionLog) -> Result<()> {
        let (error_summary, metadata) = Self::job_log_columns(log)?;
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE job_execution_logs SET
                end_time = ?1, status = ?2, vehicles_processed = ?3, vehicles_succeeded = ?4,
                vehicles_failed = ?5, duration_seconds = ?6, success_rate = ?7,
                error_summary = ?8, execution_metadata = ?9
             WHERE id = ?10",
            params![
                log.end_time.as_ref().map(Self::format_datetime),
                log.status.as_str(),
                log.vehicles_processed as i64,
                log.vehicles_succeeded as i64,
                log.vehicles_failed as i64,
                log.duration_seconds(),
                log.success_rate(),
                error_summary,
                metadata,
                id,
            ],
        )?;
        if updated == 0 {
            anyhow::bail!("Job execution log {} not found", id);
        }
        Ok(())
    }

    fn recent_job_logs(&self, job_name: &str, limit: usize) -> Result<Vec<JobExecutionLog>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM job_execution_logs WHERE job_name = ?1
             ORDER BY start_time DESC, id DESC LIMIT ?2",
        )?;
        let logs = stmt
            .query_map(params![job_name, limit as i64], Self::row_to_job_log)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(logs)
    }

    fn job_statistics(&self) -> Result<Vec<JobStatistics>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT job_name,
                    COUNT(*),
                    SUM(CASE WHEN status = 'success' THEN 1 ELSE 0 END),
                    SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END),
                    AVG(duration_seconds),
                    AVG(success_rate)
             FROM job_execution_logs
             GROUP BY job_name
             ORDER BY job_name",
        )?;
        let stats = stmt
            .query_map([], |row| {
                Ok(JobStatistics {
                    job_name: row.get(0)?,
                    total_executions: row.get::<_, i64>(1)? as u64,
                    successful_executions: row.get::<_, i64>(2)? as u64,
                    failed_executions: row.get::<_, i64>(3)? as u64,
                    avg_duration_seconds: round2(row.get::<_, Option<f64>>(4)?.unwrap_or(0.0)),
                    avg_success_rate: round2(row.get::<_, Option<f64>>(5)?.unwrap_or(0.0)),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(stats)
    }

    fn delete_job_logs_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM job_execution_logs WHERE start_time < ?1",
            params![Self::format_datetime(&cutoff)],
        )?;
        Ok(deleted)
    }
}

impl VehicleDirectory for SqliteTelemetryStore {
    fn all_vins(&self, active_only: bool) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let sql = if active_only {
            "SELECT vin FROM vehicles WHERE is_active = 1 ORDER BY vin"
        } else {
            "SELECT vin FROM vehicles ORDER BY vin"
        };
        let mut stmt = conn.prepare(sql)?;
        let vins = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(vins)
    }

    fn find_vehicle(&self, vin: &str) -> Result<Option<Vehicle>> {
        let conn = self.lock()?;
        let vehicle = conn
            .query_row(
                "SELECT * FROM vehicles WHERE vin = ?1",
                params![vin],
                Self::row_to_vehicle,
            )
            .optional()?;
        Ok(vehicle)
    }

    fn upsert_vehicle(&self, vehicle: &Vehicle) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO vehicles
                (vin, vehicle_name, make, model, year, license_plate, fleet_id, is_active,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(vin) DO UPDATE SET
                vehicle_name = excluded.vehicle_name,
                make = excluded.make,
                model = excluded.model,
                year = excluded.year,
                license_plate = excluded.license_plate,
                fleet_id = excluded.fleet_id,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at",
            params![
                vehicle.vin,
                vehicle.vehicle_name,
                vehicle.make,
                vehicle.model,
                vehicle.year,
                vehicle.license_plate,
                vehicle.fleet_id,
                vehicle.is_active as i64,
                Self::format_datetime(&vehicle.created_at),
                Self::format_datetime(&Utc::now()),
            ],
        )?;
        Ok(())
    }

    fn set_active(&self, vin: &str, active: bool) -> Result<bool> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE vehicles SET is_active = ?1, updated_at = ?2 WHERE vin = ?3",
            params![
                active as i64,
                Self::format_datetime(&Utc::now()),
                vin
            ],
        )?;
        Ok(updated > 0)
    }

    fn count_vehicles(&self, active_only: bool) -> Result<usize> {
        let conn = self.lock()?;
        let sql = if active_only {
            "SELECT COUNT(*) FROM vehicles WHERE is_active = 1"
        } else {
            "SELECT COUNT(*) FROM vehicles"
        };
        let count: i64 = conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
