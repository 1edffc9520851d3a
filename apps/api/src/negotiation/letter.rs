//! Letter drafting: turns a computed gap and its recommendations into a
//! salary adjustment request.

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::form::SubmitError;
use crate::gap::recommendations::format_currency;
use crate::gap::{GapResult, RecommendationFeed};
use crate::llm_client::prompts::{fill_template, FIGURES_INSTRUCTION};
use crate::llm_client::LlmClient;
use crate::negotiation::form::{LetterTone, SalaryForm};
use crate::negotiation::prompts::{letter_system, LETTER_PROMPT_TEMPLATE};

/// Everything a drafter may use. Figures are pre-formatted so every drafter
/// quotes the same numbers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LetterRequest {
    pub full_name: String,
    pub job_title: String,
    pub employer: String,
    pub tone: LetterTone,
    pub current_salary: f64,
    pub target_salary: Option<f64>,
    pub gap_summary: String,
    pub talking_points: Vec<String>,
}

impl LetterRequest {
    pub fn new(form: &SalaryForm, gap: &GapResult, feed: &RecommendationFeed) -> Self {
        let current_salary = gap.adjusted_salary + gap.dollar_gap;
        Self {
            full_name: form.full_name.trim().to_string(),
            job_title: form.job_title.trim().to_string(),
            employer: match form.employer.trim() {
                "" => "the company".to_string(),
                employer => employer.to_string(),
            },
            tone: form.tone,
            current_salary,
            target_salary: feed.target_salary(),
            gap_summary: feed.summary.clone(),
            talking_points: feed
                .items
                .iter()
                .map(|r| format!("{}: {}", r.headline, r.detail))
                .collect(),
        }
    }

    pub fn to_prompt(&self) -> String {
        let target = self
            .target_salary
            .map(format_currency)
            .unwrap_or_else(|| "no increase requested; ask for a review of the role".to_string());
        let talking_points = self
            .talking_points
            .iter()
            .map(|p| format!("- {p}"))
            .collect::<Vec<_>>()
            .join("\n");

        fill_template(
            LETTER_PROMPT_TEMPLATE,
            &[
                ("figures_instruction", FIGURES_INSTRUCTION),
                ("full_name", &self.full_name),
                ("job_title", &self.job_title),
                ("employer", &self.employer),
                ("tone", self.tone.describe()),
                ("current_salary", &format_currency(self.current_salary)),
                ("target_salary", &target),
                ("gap_summary", &self.gap_summary),
                ("talking_points", &talking_points),
            ],
        )
    }
}

/// Pluggable letter drafter. Errors come back already classified so the
/// submission coordinator can decide whether to retry.
#[async_trait]
pub trait LetterDrafter: Send + Sync {
    async fn draft(&self, request: &LetterRequest) -> Result<String, SubmitError>;
}

// ────────────────────────────────────────────────────────────────────────────
// LlmLetterDrafter
// ────────────────────────────────────────────────────────────────────────────

pub struct LlmLetterDrafter {
    llm: LlmClient,
}

impl LlmLetterDrafter {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl LetterDrafter for LlmLetterDrafter {
    async fn draft(&self, request: &LetterRequest) -> Result<String, SubmitError> {
        let letter = self
            .llm
            .call_text(&request.to_prompt(), &letter_system())
            .await?;
        info!("Drafted letter ({} chars)", letter.len());
        Ok(letter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gap::{build_recommendations, Severity};
    use chrono::Utc;

    fn gap() -> GapResult {
        GapResult {
            adjusted_salary: 88_000.0,
            percentage_gap: -3.409,
            dollar_gap: -3_000.0,
            inflation_rate: 10.0,
            annualized_inflation_rate: 2.4,
            years_elapsed: 4.0,
            historical_index: 280.0,
            current_index: 308.0,
            severity: Severity::Moderate,
            calculation_date: Utc::now(),
        }
    }

    fn form() -> SalaryForm {
        SalaryForm {
            full_name: " Ada Lovelace ".into(),
            job_title: "Analyst".into(),
            ..SalaryForm::default()
        }
    }

    #[test]
    fn test_request_carries_feed_figures() {
        let feed = build_recommendations(&gap(), 85_000.0);
        let request = LetterRequest::new(&form(), &gap(), &feed);

        assert_eq!(request.full_name, "Ada Lovelace");
        assert_eq!(request.employer, "the company");
        assert!((request.current_salary - 85_000.0).abs() < 1e-6);
        assert_eq!(request.target_salary, feed.target_salary());
        assert_eq!(request.talking_points.len(), feed.items.len());
    }

    #[test]
    fn test_prompt_has_no_unfilled_placeholders() {
        let feed = build_recommendations(&gap(), 85_000.0);
        let prompt = LetterRequest::new(&form(), &gap(), &feed).to_prompt();

        assert!(prompt.contains("Ada Lovelace, Analyst at the company"));
        assert!(prompt.contains("$85,000"));
        assert!(prompt.contains(FIGURES_INSTRUCTION));
        for placeholder in ["{full_name}", "{tone}", "{target_salary}", "{talking_points}"] {
            assert!(!prompt.contains(placeholder), "{placeholder} left in prompt");
        }
    }
}
