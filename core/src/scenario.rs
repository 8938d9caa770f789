use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::SimulationError;

/// A sales situation the user rehearses against.
/// Scenarios are loaded once at startup and never mutated while the service runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    /// Unique, immutable identifier
    pub id: i64,
    pub title: String,
    /// What counts as success for the user
    pub goal: String,
    /// Description of the simulated customer
    pub customer_persona: String,
    /// Keywords the user is expected to use, in display order
    #[serde(default)]
    pub required_keywords: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("duplicate scenario id {0}")]
    DuplicateId(i64),

    #[error("scenario {id}: field '{field}' must not be empty")]
    EmptyField { id: i64, field: &'static str },

    #[error("scenario {id}: persona mentions required keyword '{keyword}'")]
    PersonaMentionsKeyword { id: i64, keyword: String },

    #[error("failed to read scenario file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse scenario file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Read-only scenario repository.
#[derive(Debug, Clone)]
pub struct ScenarioCatalog {
    scenarios: BTreeMap<i64, Arc<Scenario>>,
}

impl ScenarioCatalog {
    pub fn new(scenarios: Vec<Scenario>) -> Result<Self, CatalogError> {
        let mut by_id = BTreeMap::new();
        for scenario in scenarios {
            for (field, value) in [
                ("title", &scenario.title),
                ("goal", &scenario.goal),
                ("customerPersona", &scenario.customer_persona),
            ] {
                if value.trim().is_empty() {
                    return Err(CatalogError::EmptyField {
                        id: scenario.id,
                        field,
                    });
                }
            }
            let persona = scenario.customer_persona.to_lowercase();
            if let Some(keyword) = scenario
                .required_keywords
                .iter()
                .map(|keyword| keyword.trim())
                .find(|keyword| !keyword.is_empty() && persona.contains(&keyword.to_lowercase()))
            {
                return Err(CatalogError::PersonaMentionsKeyword {
                    id: scenario.id,
                    keyword: keyword.to_string(),
                });
            }
            let id = scenario.id;
            if by_id.insert(id, Arc::new(scenario)).is_some() {
                return Err(CatalogError::DuplicateId(id));
            }
        }
        Ok(Self { scenarios: by_id })
    }

    /// Parse a JSON array of scenarios.
    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let scenarios: Vec<Scenario> = serde_json::from_str(raw)?;
        Self::new(scenarios)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn get(&self, id: i64) -> Result<Arc<Scenario>, SimulationError> {
        self.scenarios
            .get(&id)
            .cloned()
            .ok_or(SimulationError::NotFound { scenario_id: id })
    }

    /// All scenarios ordered by id.
    pub fn list(&self) -> Vec<Arc<Scenario>> {
        self.scenarios.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    /// The scenario set shipped with the service, ids 1 through 5.
    pub fn builtin() -> Self {
        let scenarios = vec![
            builtin_scenario(
                1,
                "Cold call: CRM upgrade",
                "Book a 30-minute product demo with the operations manager.",
                "Dana, operations manager at a 40-person logistics firm. Busy, mildly irritated by \
                 the interruption, happy with the current spreadsheet-based process and wary of \
                 expensive tools.",
                &["demo", "time savings", "roi"],
            ),
            builtin_scenario(
                2,
                "Renewal at risk",
                "Secure a verbal commitment to renew the annual subscription.",
                "Marcus, head of IT at a mid-size retailer. Had two outages last quarter, has been \
                 approached by a cheaper competitor and expects a concession before renewing.",
                &["reliability", "roadmap", "discount"],
            ),
            builtin_scenario(
                3,
                "Price objection",
                "Close the deal without dropping the price by more than 5%.",
                "Priya, procurement lead. Polite but firm, compares every line item against a \
                 competing quote and repeats that the budget is fixed.",
                &["value", "total cost", "implementation"],
            ),
            builtin_scenario(
                4,
                "Upsell to premium tier",
                "Get agreement to trial the premium tier for the analytics team.",
                "Tom, analytics team lead and existing customer. Friendly, enjoys the current \
                 product, doubts the team needs more features and dislikes sales pressure.",
                &["trial", "dashboards", "team productivity"],
            ),
            builtin_scenario(
                5,
                "Inbound lead qualification",
                "Qualify the lead on budget, authority, need and timeline, and schedule a follow-up.",
                "Lena, founder of a small e-commerce startup who filled in a web form. Curious and \
                 talkative, evasive about how much she can spend, and mentions a co-founder who \
                 has a say in every purchase.",
                &["budget", "decision maker", "timeline", "follow-up"],
            ),
        ];
        Self {
            scenarios: scenarios
                .into_iter()
                .map(|scenario| (scenario.id, Arc::new(scenario)))
                .collect(),
        }
    }
}

fn builtin_scenario(
    id: i64,
    title: &str,
    goal: &str,
    customer_persona: &str,
    required_keywords: &[&str],
) -> Scenario {
    Scenario {
        id,
        title: title.to_string(),
        goal: goal.to_string(),
        customer_persona: customer_persona.to_string(),
        required_keywords: required_keywords.iter().map(|k| k.to_string()).collect(),
    }
}
