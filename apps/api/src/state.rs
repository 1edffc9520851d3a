use std::sync::Arc;

use crate::config::Config;
use crate::form::{FormRegistry, SnapshotAdapter, SnapshotStore};
use crate::gap::{IndexLookup, SeverityBands};
use crate::negotiation::{salary_rules, LetterDrafter, NegotiationAction, SalaryForm};

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Inflation index. Default: IndexSeries loaded from INDEX_SERIES_PATH.
    pub index: Arc<dyn IndexLookup>,
    pub bands: SeverityBands,
    /// Live salary form sessions, one per form key.
    pub forms: Arc<FormRegistry<SalaryForm>>,
    /// Submit action shared by every salary form session.
    pub negotiation: NegotiationAction,
}

impl AppState {
    pub fn new(
        config: Config,
        index: Arc<dyn IndexLookup>,
        store: Arc<dyn SnapshotStore>,
        drafter: Option<Arc<dyn LetterDrafter>>,
    ) -> Self {
        let adapter = SnapshotAdapter::new(store, config.snapshot_max_age);
        let forms = FormRegistry::new(
            adapter,
            config.form_policy,
            config.registry_limits,
            SalaryForm::default(),
            salary_rules,
        );
        Self {
            bands: config.bands,
            negotiation: NegotiationAction::new(index.clone(), config.bands, drafter),
            forms: Arc::new(forms),
            index,
            config,
        }
    }
}
