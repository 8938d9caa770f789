//! The simulation pipeline: scenario lookup, prompt synthesis, completion,
//! feedback validation and session logging.
//!
//! Each call owns its transcript and an `Arc` of its scenario; nothing is locked
//! across the completion await. If the caller's future is dropped (client went
//! away) before validation finishes, no session log is written.

use std::sync::Arc;

use rehearse_core::error::SimulationError;
use rehearse_core::feedback::{Feedback, validate};
use rehearse_core::prompts::{build_analyze_prompt, build_respond_prompt};
use rehearse_core::scenario::ScenarioCatalog;
use rehearse_core::session::{NewSessionLog, ResponseWarning};
use rehearse_core::transcript::Transcript;
use uuid::Uuid;

use crate::gateway::{CompletionGateway, CompletionMode};
use crate::session_log::SessionLogWriter;

#[derive(Debug)]
pub struct AnalysisOutcome {
    pub feedback: Feedback,
    /// None when the session log could not be written
    pub log_id: Option<Uuid>,
    pub warnings: Vec<ResponseWarning>,
}

pub struct Simulator {
    scenarios: Arc<ScenarioCatalog>,
    gateway: CompletionGateway,
    session_logs: Arc<dyn SessionLogWriter>,
}

impl Simulator {
    pub fn new(
        scenarios: Arc<ScenarioCatalog>,
        gateway: CompletionGateway,
        session_logs: Arc<dyn SessionLogWriter>,
    ) -> Self {
        Self {
            scenarios,
            gateway,
            session_logs,
        }
    }

    pub fn scenarios(&self) -> &ScenarioCatalog {
        &self.scenarios
    }

    /// Next customer turn. Upstream failures yield the fallback line, never an error.
    pub async fn respond(
        &self,
        scenario_id: i64,
        transcript: &Transcript,
    ) -> Result<String, SimulationError> {
        let scenario = self.scenarios.get(scenario_id)?;
        let prompt = build_respond_prompt(&scenario, transcript);
        Ok(self.gateway.respond(&prompt).await)
    }

    /// Score the user's side of the transcript and log the session.
    ///
    /// Upstream and validation failures are returned as errors and nothing is logged.
    /// A failed log write only adds a warning to the outcome.
    pub async fn analyze(
        &self,
        user_id: Uuid,
        scenario_id: i64,
        transcript: Transcript,
    ) -> Result<AnalysisOutcome, SimulationError> {
        let scenario = self.scenarios.get(scenario_id)?;
        let prompt = build_analyze_prompt(&scenario, &transcript);

        let raw = self.gateway.complete(&prompt, CompletionMode::Analyze).await?;
        let feedback = validate(&raw, &scenario).inspect_err(|err| {
            tracing::warn!(
                scenario_id,
                user_id = %user_id,
                error = %err,
                "analysis output failed validation"
            );
        })?;

        let log = NewSessionLog {
            user_id,
            scenario_id,
            transcript,
            feedback: feedback.clone(),
        };

        let (log_id, warnings) = match self.session_logs.record(log).await {
            Ok(id) => {
                tracing::info!(scenario_id, user_id = %user_id, log_id = %id, "session logged");
                (Some(id), Vec::new())
            }
            Err(err) => {
                tracing::error!(
                    scenario_id,
                    user_id = %user_id,
                    error = %err,
                    "session log write failed; returning feedback anyway"
                );
                (
                    None,
                    vec![ResponseWarning::new(
                        "sessionLog",
                        "Feedback was computed but this session could not be saved to your history.",
                    )],
                )
            }
        };

        Ok(AnalysisOutcome {
            feedback,
            log_id,
            warnings,
        })
    }
}
