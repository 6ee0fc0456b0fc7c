use crate::app_dirs::AppDirs;
use crate::error::Result;
use crate::results::{TestResult, ThresholdPoint};
use crate::step::{Ear, ResponseStatus, TestType};
use chrono::{DateTime, Local};
use rusqlite::{params, Connection};
use std::path::Path;

/// One stored session, without its thresholds
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub session_id: String,
    pub patient_id: String,
    pub timestamp: DateTime<Local>,
    pub test_duration_ms: u64,
    pub threshold_count: i64,
    pub technical_errors: Vec<String>,
}

/// A threshold as recorded in some earlier session
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalThreshold {
    pub session_id: String,
    pub timestamp: DateTime<Local>,
    pub level: Option<i32>,
    pub status: ResponseStatus,
    pub confirmed: bool,
}

/// Database of finalized session results
#[derive(Debug)]
pub struct HistoryDb {
    conn: Connection,
}

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS sessions (
        session_id TEXT PRIMARY KEY,
        patient_id TEXT NOT NULL,
        timestamp TEXT NOT NULL,
        test_duration_ms INTEGER NOT NULL,
        technical_errors TEXT NOT NULL,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP
    );
    CREATE TABLE IF NOT EXISTS thresholds (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id TEXT NOT NULL REFERENCES sessions(session_id),
        step_id INTEGER NOT NULL,
        frequency INTEGER NOT NULL,
        ear TEXT NOT NULL,
        test_type TEXT NOT NULL,
        level INTEGER,
        status TEXT NOT NULL,
        confirmed BOOLEAN NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_thresholds_point ON thresholds(frequency, ear, test_type);
    CREATE INDEX IF NOT EXISTS idx_sessions_timestamp ON sessions(timestamp);
"#;

impl HistoryDb {
    /// Open the database at the default location, creating it if needed
    pub fn new() -> Result<Self> {
        Self::open(AppDirs::resolve().history_db_path())
    }

    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        // Create parent directory if it doesn't exist
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(db_path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(HistoryDb { conn })
    }

    /// Store a result and all of its thresholds in one transaction
    pub fn record_result(&mut self, result: &TestResult) -> Result<()> {
        let errors = serde_json::to_string(&result.technical_errors)?;

        let tx = self.conn.transaction()?;
        tx.execute(
            r#"
            INSERT INTO sessions
            (session_id, patient_id, timestamp, test_duration_ms, technical_errors)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                result.session_id,
                result.patient_id,
                result.timestamp.to_rfc3339(),
                result.test_duration_ms as i64,
                errors,
            ],
        )?;

        for point in &result.thresholds {
            tx.execute(
                r#"
                INSERT INTO thresholds
                (session_id, step_id, frequency, ear, test_type, level, status, confirmed)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    result.session_id,
                    point.step_id as i64,
                    point.frequency,
                    point.ear.to_string(),
                    point.test_type.to_string(),
                    point.level,
                    point.status.to_string(),
                    point.confirmed,
                ],
            )?;
        }

        tx.commit()?;
        log::debug!(
            "stored session {} with {} thresholds",
            result.session_id,
            result.thresholds.len()
        );
        Ok(())
    }

    /// Most recent sessions first
    pub fn recent_sessions(&self, limit: usize) -> Result<Vec<SessionSummary>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT s.session_id, s.patient_id, s.timestamp, s.test_duration_ms,
                   s.technical_errors, COUNT(t.id)
            FROM sessions s
            LEFT JOIN thresholds t ON t.session_id = s.session_id
            GROUP BY s.session_id
            ORDER BY s.timestamp DESC
            LIMIT ?1
            "#,
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            let errors: String = row.get(4)?;
            let technical_errors = serde_json::from_str(&errors).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
            })?;
            Ok(SessionSummary {
                session_id: row.get(0)?,
                patient_id: row.get(1)?,
                timestamp: parse_timestamp(row.get(2)?, 2)?,
                test_duration_ms: row.get::<_, i64>(3)?.max(0) as u64,
                threshold_count: row.get(5)?,
                technical_errors,
            })
        })?;

        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Every stored threshold for one frequency, ear and conduction path
    pub fn thresholds_for(
        &self,
        frequency: u32,
        ear: Ear,
        test_type: TestType,
    ) -> Result<Vec<HistoricalThreshold>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT t.session_id, s.timestamp, t.level, t.status, t.confirmed
            FROM thresholds t
            JOIN sessions s ON s.session_id = t.session_id
            WHERE t.frequency = ?1 AND t.ear = ?2 AND t.test_type = ?3
            ORDER BY s.timestamp DESC, t.step_id
            "#,
        )?;

        let rows = stmt.query_map(
            params![frequency, ear.to_string(), test_type.to_string()],
            |row| {
                Ok(HistoricalThreshold {
                    session_id: row.get(0)?,
                    timestamp: parse_timestamp(row.get(1)?, 1)?,
                    level: row.get(2)?,
                    status: parse_status(&row.get::<_, String>(3)?, 3)?,
                    confirmed: row.get(4)?,
                })
            },
        )?;

        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Thresholds of one stored session, in protocol order
    pub fn session_thresholds(&self, session_id: &str) -> Result<Vec<ThresholdPoint>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT step_id, frequency, ear, test_type, level, status, confirmed
            FROM thresholds
            WHERE session_id = ?1
            ORDER BY step_id
            "#,
        )?;

        let rows = stmt.query_map([session_id], |row| {
            Ok(ThresholdPoint {
                step_id: row.get::<_, i64>(0)? as usize,
                frequency: row.get(1)?,
                ear: parse_ear(&row.get::<_, String>(2)?, 2)?,
                test_type: parse_test_type(&row.get::<_, String>(3)?, 3)?,
                level: row.get(4)?,
                status: parse_status(&row.get::<_, String>(5)?, 5)?,
                confirmed: row.get(6)?,
            })
        })?;

        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Clear all history (for testing or reset purposes)
    pub fn clear_all(&self) -> Result<()> {
        self.conn
            .execute_batch("DELETE FROM thresholds; DELETE FROM sessions;")?;
        Ok(())
    }
}

fn invalid_text(column: usize, what: &str) -> rusqlite::Error {
    rusqlite::Error::InvalidColumnType(column, what.to_string(), rusqlite::types::Type::Text)
}

fn parse_timestamp(raw: String, column: usize) -> rusqlite::Result<DateTime<Local>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Local))
        .map_err(|_| invalid_text(column, "timestamp"))
}

fn parse_ear(raw: &str, column: usize) -> rusqlite::Result<Ear> {
    match raw {
        "right" => Ok(Ear::Right),
        "left" => Ok(Ear::Left),
        _ => Err(invalid_text(column, "ear")),
    }
}

fn parse_test_type(raw: &str, column: usize) -> rusqlite::Result<TestType> {
    match raw {
        "air" => Ok(TestType::Air),
        "bone" => Ok(TestType::Bone),
        _ => Err(invalid_text(column, "test_type")),
    }
}

fn parse_status(raw: &str, column: usize) -> rusqlite::Result<ResponseStatus> {
    match raw {
        "threshold" => Ok(ResponseStatus::Threshold),
        "no_response" => Ok(ResponseStatus::NoResponse),
        "not_tested" => Ok(ResponseStatus::NotTested),
        _ => Err(invalid_text(column, "status")),
    }
}
