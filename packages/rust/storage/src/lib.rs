//! libSQL storage layer for lexpipe (local embedded mode).
//!
//! The [`Storage`] struct wraps a libSQL database holding validated
//! obligations and the pipeline job queue.
//!
//! **Access rules:**
//! - Pipeline and CLI: read-write (sole writer) via [`Storage::open`]
//! - Inspection tooling: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};

use lexpipe_shared::{
    JobId, JobStatus, LexpipeError, ObligationId, ObligationStatus, PipelineJob, Result,
    ValidatedObligation,
};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LexpipeError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| LexpipeError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| LexpipeError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| LexpipeError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| LexpipeError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    LexpipeError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(LexpipeError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Obligation operations
    // -----------------------------------------------------------------------

    /// Upsert an obligation record, keyed by its id. Re-validating the same
    /// snapshot overwrites rather than duplicates.
    pub async fn upsert_obligation(&self, obligation: &ValidatedObligation) -> Result<()> {
        self.check_writable()?;
        let payload = serde_json::to_string(obligation)
            .map_err(|e| LexpipeError::Storage(e.to_string()))?;
        self.conn
            .execute(
                "INSERT INTO obligations
                   (id, source_legal_act, source_article_number, status,
                    is_duplicate, validation_score, validated_at, payload_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                   source_legal_act = excluded.source_legal_act,
                   source_article_number = excluded.source_article_number,
                   status = excluded.status,
                   is_duplicate = excluded.is_duplicate,
                   validation_score = excluded.validation_score,
                   validated_at = excluded.validated_at,
                   payload_json = excluded.payload_json",
                params![
                    obligation.id.to_string(),
                    obligation.raw.source_legal_act.as_str(),
                    obligation.raw.source_article_number.as_str(),
                    obligation.status.to_string(),
                    obligation.is_duplicate as i64,
                    obligation.validation_score,
                    obligation.validated_at.to_rfc3339(),
                    payload.as_str(),
                ],
            )
            .await
            .map_err(|e| LexpipeError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Get an obligation by id.
    pub async fn get_obligation(&self, id: &ObligationId) -> Result<Option<ValidatedObligation>> {
        let mut rows = self
            .conn
            .query(
                "SELECT payload_json FROM obligations WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| LexpipeError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_obligation(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(LexpipeError::Storage(e.to_string())),
        }
    }

    /// List obligations, optionally filtered by status, newest first.
    pub async fn list_obligations(
        &self,
        status: Option<ObligationStatus>,
    ) -> Result<Vec<ValidatedObligation>> {
        let mut rows = match status {
            Some(s) => self
                .conn
                .query(
                    "SELECT payload_json FROM obligations
                     WHERE status = ?1 ORDER BY validated_at DESC",
                    params![s.to_string()],
                )
                .await
                .map_err(|e| LexpipeError::Storage(e.to_string()))?,
            None => self
                .conn
                .query(
                    "SELECT payload_json FROM obligations ORDER BY validated_at DESC",
                    params![],
                )
                .await
                .map_err(|e| LexpipeError::Storage(e.to_string()))?,
        };

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_obligation(&row)?);
        }
        Ok(results)
    }

    /// Move an obligation to a new status, keeping the serialized payload in
    /// sync with the denormalized column.
    pub async fn set_obligation_status(
        &self,
        id: &ObligationId,
        status: ObligationStatus,
    ) -> Result<()> {
        self.check_writable()?;
        let Some(mut obligation) = self.get_obligation(id).await? else {
            return Err(LexpipeError::Storage(format!("obligation {id} not found")));
        };
        obligation.status = status;
        self.upsert_obligation(&obligation).await
    }

    // -----------------------------------------------------------------------
    // Job operations
    // -----------------------------------------------------------------------

    /// Insert a new pipeline job.
    pub async fn insert_job(&self, job: &PipelineJob) -> Result<()> {
        self.check_writable()?;
        let result_json = job
            .result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| LexpipeError::Storage(e.to_string()))?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO jobs
                   (id, source_url, title, status, current_step, progress_percent,
                    result_json, error_message, started_at, completed_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    job.id.to_string(),
                    job.source_url.as_str(),
                    job.title.as_str(),
                    job.status.to_string(),
                    job.current_step.as_str(),
                    job.progress_percent as i64,
                    result_json.as_deref(),
                    job.error_message.as_deref(),
                    job.started_at.map(|t| t.to_rfc3339()),
                    job.completed_at.map(|t| t.to_rfc3339()),
                    now.as_str(),
                ],
            )
            .await
            .map_err(|e| LexpipeError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Persist a job's current state. The status transition must be legal
    /// and progress must not move backwards.
    pub async fn update_job(&self, job: &PipelineJob) -> Result<()> {
        self.check_writable()?;
        let Some(existing) = self.get_job(&job.id).await? else {
            return Err(LexpipeError::Storage(format!("job {} not found", job.id)));
        };
        if job.status != existing.status && !existing.status.can_transition_to(job.status) {
            return Err(LexpipeError::Storage(format!(
                "illegal job transition {} -> {}",
                existing.status, job.status
            )));
        }
        if job.progress_percent < existing.progress_percent && !job.status.is_terminal() {
            return Err(LexpipeError::Storage(format!(
                "job progress moved backwards ({} -> {})",
                existing.progress_percent, job.progress_percent
            )));
        }

        let result_json = job
            .result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| LexpipeError::Storage(e.to_string()))?;
        self.conn
            .execute(
                "UPDATE jobs SET
                   status = ?1, current_step = ?2, progress_percent = ?3,
                   result_json = ?4, error_message = ?5, started_at = ?6,
                   completed_at = ?7
                 WHERE id = ?8",
                params![
                    job.status.to_string(),
                    job.current_step.as_str(),
                    job.progress_percent as i64,
                    result_json.as_deref(),
                    job.error_message.as_deref(),
                    job.started_at.map(|t| t.to_rfc3339()),
                    job.completed_at.map(|t| t.to_rfc3339()),
                    job.id.to_string(),
                ],
            )
            .await
            .map_err(|e| LexpipeError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Get a job by id.
    pub async fn get_job(&self, id: &JobId) -> Result<Option<PipelineJob>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, source_url, title, status, current_step, progress_percent,
                        result_json, error_message, started_at, completed_at
                 FROM jobs WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| LexpipeError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_job(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(LexpipeError::Storage(e.to_string())),
        }
    }

    /// List jobs, optionally filtered by status, oldest first (queue order).
    pub async fn list_jobs(&self, status: Option<JobStatus>) -> Result<Vec<PipelineJob>> {
        let mut rows = match status {
            Some(s) => self
                .conn
                .query(
                    "SELECT id, source_url, title, status, current_step, progress_percent,
                            result_json, error_message, started_at, completed_at
                     FROM jobs WHERE status = ?1 ORDER BY created_at",
                    params![s.to_string()],
                )
                .await
                .map_err(|e| LexpipeError::Storage(e.to_string()))?,
            None => self
                .conn
                .query(
                    "SELECT id, source_url, title, status, current_step, progress_percent,
                            result_json, error_message, started_at, completed_at
                     FROM jobs ORDER BY created_at",
                    params![],
                )
                .await
                .map_err(|e| LexpipeError::Storage(e.to_string()))?,
        };

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_job(&row)?);
        }
        Ok(results)
    }

    /// Reset an errored job back to queued (the single backward edge in the
    /// job state machine). Returns the reset job.
    pub async fn retry_job(&self, id: &JobId) -> Result<PipelineJob> {
        self.check_writable()?;
        let Some(job) = self.get_job(id).await? else {
            return Err(LexpipeError::Storage(format!("job {id} not found")));
        };
        if job.status != JobStatus::Error {
            return Err(LexpipeError::Storage(format!(
                "job {id} is {}, only errored jobs can be retried",
                job.status
            )));
        }

        self.conn
            .execute(
                "UPDATE jobs SET
                   status = 'queued', current_step = 'queued', progress_percent = 0,
                   error_message = NULL, started_at = NULL, completed_at = NULL
                 WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| LexpipeError::Storage(e.to_string()))?;

        Ok(PipelineJob {
            status: JobStatus::Queued,
            current_step: "queued".into(),
            progress_percent: 0,
            error_message: None,
            started_at: None,
            completed_at: None,
            ..job
        })
    }
}

/// Deserialize an obligation row (single `payload_json` column).
fn row_to_obligation(row: &libsql::Row) -> Result<ValidatedObligation> {
    let payload: String = row
        .get(0)
        .map_err(|e| LexpipeError::Storage(e.to_string()))?;
    serde_json::from_str(&payload).map_err(|e| LexpipeError::Storage(e.to_string()))
}

/// Convert a database row to a [`PipelineJob`].
fn row_to_job(row: &libsql::Row) -> Result<PipelineJob> {
    let status_str: String = row
        .get(3)
        .map_err(|e| LexpipeError::Storage(e.to_string()))?;
    let result_json: Option<String> = row.get(6).ok();
    let result = result_json
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| LexpipeError::Storage(e.to_string()))?;

    Ok(PipelineJob {
        id: {
            let s: String = row
                .get(0)
                .map_err(|e| LexpipeError::Storage(e.to_string()))?;
            JobId::from_str(&s).map_err(|e| LexpipeError::Storage(e.to_string()))?
        },
        source_url: row
            .get::<String>(1)
            .map_err(|e| LexpipeError::Storage(e.to_string()))?,
        title: row
            .get::<String>(2)
            .map_err(|e| LexpipeError::Storage(e.to_string()))?,
        status: JobStatus::from_str(&status_str).map_err(LexpipeError::Storage)?,
        current_step: row
            .get::<String>(4)
            .map_err(|e| LexpipeError::Storage(e.to_string()))?,
        progress_percent: row
            .get::<i64>(5)
            .map_err(|e| LexpipeError::Storage(e.to_string()))? as u8,
        result,
        error_message: row.get::<String>(7).ok(),
        started_at: parse_optional_date(row.get::<String>(8).ok())?,
        completed_at: parse_optional_date(row.get::<String>(9).ok())?,
    })
}

fn parse_optional_date(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
    s.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| LexpipeError::Storage(format!("invalid date: {e}")))
    })
    .transpose()
}
