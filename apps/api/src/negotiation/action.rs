//! Submit action for the salary form: gap, recommendations, and an optional letter.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::form::{SubmitAction, SubmitError};
use crate::gap::{build_recommendations, compute_gap, GapResult, IndexLookup, RecommendationFeed, SeverityBands};
use crate::negotiation::form::SalaryForm;
use crate::negotiation::letter::{LetterDrafter, LetterRequest};

#[derive(Debug, Clone, Serialize)]
pub struct NegotiationPacket {
    pub gap: GapResult,
    pub recommendations: RecommendationFeed,
    /// Absent when no drafter is configured.
    pub letter: Option<String>,
}

#[derive(Clone)]
pub struct NegotiationAction {
    index: Arc<dyn IndexLookup>,
    bands: SeverityBands,
    drafter: Option<Arc<dyn LetterDrafter>>,
}

impl NegotiationAction {
    pub fn new(
        index: Arc<dyn IndexLookup>,
        bands: SeverityBands,
        drafter: Option<Arc<dyn LetterDrafter>>,
    ) -> Self {
        Self {
            index,
            bands,
            drafter,
        }
    }
}

#[async_trait]
impl SubmitAction<SalaryForm> for NegotiationAction {
    type Output = NegotiationPacket;

    async fn submit(&self, form: &SalaryForm) -> Result<NegotiationPacket, SubmitError> {
        let (historical, current) = form
            .observations()
            .ok_or_else(|| SubmitError::Fatal("salary amounts and dates are incomplete".to_string()))?;

        // Bad input or a date outside the index will not improve on retry.
        let gap = compute_gap(&historical, &current, self.index.as_ref(), &self.bands)
            .map_err(|e| SubmitError::Fatal(e.to_string()))?;
        let recommendations = build_recommendations(&gap, current.amount);
        debug!(
            "Gap computed: {:.2}% ({}), {} recommendation(s)",
            gap.percentage_gap,
            gap.severity.label(),
            recommendations.items.len()
        );

        let letter = match &self.drafter {
            Some(drafter) => {
                let request = LetterRequest::new(form, &gap, &recommendations);
                Some(drafter.draft(&request).await?)
            }
            None => None,
        };

        Ok(NegotiationPacket {
            gap,
            recommendations,
            letter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gap::{IndexPoint, IndexSeries, Severity};
    use crate::negotiation::form::LetterTone;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn index() -> Arc<dyn IndexLookup> {
        Arc::new(
            IndexSeries::from_points(vec![
                IndexPoint {
                    date: date(2020, 1, 1),
                    value: 280.0,
                },
                IndexPoint {
                    date: date(2024, 1, 1),
                    value: 308.0,
                },
            ])
            .unwrap(),
        )
    }

    fn form() -> SalaryForm {
        SalaryForm {
            full_name: "Ada Lovelace".into(),
            email: "ada@example.com".into(),
            job_title: "Analyst".into(),
            employer: String::new(),
            historical_salary: Some(80_000.0),
            historical_date: Some(date(2020, 1, 1)),
            current_salary: Some(85_000.0),
            current_date: Some(date(2024, 1, 1)),
            tone: LetterTone::Collaborative,
        }
    }

    struct EchoDrafter(AtomicU32);

    #[async_trait]
    impl LetterDrafter for EchoDrafter {
        async fn draft(&self, request: &LetterRequest) -> Result<String, SubmitError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(format!("Dear manager, {}", request.full_name))
        }
    }

    struct DownDrafter;

    #[async_trait]
    impl LetterDrafter for DownDrafter {
        async fn draft(&self, _request: &LetterRequest) -> Result<String, SubmitError> {
            Err(SubmitError::Transient("529 overloaded".to_string()))
        }
    }

    #[tokio::test]
    async fn test_packet_without_drafter() {
        let action = NegotiationAction::new(index(), SeverityBands::default(), None);
        let packet = action.submit(&form()).await.unwrap();

        assert!((packet.gap.adjusted_salary - 88_000.0).abs() < 1e-6);
        assert_eq!(packet.gap.severity, Severity::Moderate);
        assert_eq!(packet.recommendations.severity, Severity::Moderate);
        assert!(packet.letter.is_none());
    }

    #[tokio::test]
    async fn test_packet_with_drafter() {
        let drafter = Arc::new(EchoDrafter(AtomicU32::new(0)));
        let action = NegotiationAction::new(index(), SeverityBands::default(), Some(drafter.clone()));
        let packet = action.submit(&form()).await.unwrap();

        assert_eq!(packet.letter.as_deref(), Some("Dear manager, Ada Lovelace"));
        assert_eq!(drafter.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drafter_classification_passes_through() {
        let action = NegotiationAction::new(index(), SeverityBands::default(), Some(Arc::new(DownDrafter)));
        let err = action.submit(&form()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_date_outside_index_is_fatal() {
        let action = NegotiationAction::new(index(), SeverityBands::default(), None);
        let early = SalaryForm {
            historical_date: Some(date(2019, 6, 1)),
            ..form()
        };
        let err = action.submit(&early).await.unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("2019-06-01"));
    }

    #[tokio::test]
    async fn test_incomplete_form_is_fatal() {
        let action = NegotiationAction::new(index(), SeverityBands::default(), None);
        let err = action.submit(&SalaryForm::default()).await.unwrap_err();
        assert!(matches!(err, SubmitError::Fatal(_)));
    }
}
