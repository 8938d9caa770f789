//! Append-only persistence of finished, scored simulations.

use async_trait::async_trait;
use rehearse_core::error::PersistenceError;
use rehearse_core::session::NewSessionLog;
use sqlx::PgPool;
use uuid::Uuid;

#[async_trait]
pub trait SessionLogWriter: Send + Sync {
    /// Insert a new log and return its id. There is no update path.
    async fn record(&self, log: NewSessionLog) -> Result<Uuid, PersistenceError>;
}

pub struct PgSessionLogWriter {
    pool: PgPool,
}

impl PgSessionLogWriter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionLogWriter for PgSessionLogWriter {
    async fn record(&self, log: NewSessionLog) -> Result<Uuid, PersistenceError> {
        let id = Uuid::now_v7();
        let transcript = serde_json::to_value(&log.transcript)
            .map_err(|e| PersistenceError(format!("failed to serialize transcript: {e}")))?;
        let feedback = serde_json::to_value(&log.feedback)
            .map_err(|e| PersistenceError(format!("failed to serialize feedback: {e}")))?;

        sqlx::query(
            "INSERT INTO session_logs (id, user_id, scenario_id, transcript, feedback) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(log.user_id)
        .bind(log.scenario_id)
        .bind(transcript)
        .bind(feedback)
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError(e.to_string()))?;

        Ok(id)
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Keeps logs in memory; can be switched to fail every write.
    #[derive(Default)]
    pub struct MemorySessionLogWriter {
        logs: Mutex<Vec<(Uuid, NewSessionLog)>>,
        fail: bool,
    }

    impl MemorySessionLogWriter {
        pub fn failing() -> Self {
            Self {
                logs: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        pub fn logs(&self) -> Vec<(Uuid, NewSessionLog)> {
            self.logs.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SessionLogWriter for MemorySessionLogWriter {
        async fn record(&self, log: NewSessionLog) -> Result<Uuid, PersistenceError> {
            if self.fail {
                return Err(PersistenceError("database unavailable".to_string()));
            }
            let id = Uuid::now_v7();
            self.logs.lock().unwrap().push((id, log));
            Ok(id)
        }
    }
}
