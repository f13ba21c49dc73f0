use assessment_ledger::config::ScoringConfig;
use assessment_ledger::error::AppError;
use assessment_ledger::workflows::assessment::{
    AssessmentService, MemoryLedger, StaticStandardsCatalog, YearMonth,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

pub(crate) type MemoryAssessmentService = AssessmentService<MemoryLedger, StaticStandardsCatalog>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Built-in standards unless a catalog export is configured.
pub(crate) fn load_catalog(path: Option<&Path>) -> Result<StaticStandardsCatalog, AppError> {
    match path {
        Some(path) => {
            let catalog = StaticStandardsCatalog::from_path(path)?;
            info!(path = %path.display(), "loaded standards catalog export");
            Ok(catalog)
        }
        None => Ok(StaticStandardsCatalog::standard()),
    }
}

pub(crate) fn build_service(config: &ScoringConfig) -> Result<Arc<MemoryAssessmentService>, AppError> {
    let catalog = load_catalog(config.standards_csv.as_deref())?;
    Ok(Arc::new(AssessmentService::new(
        Arc::new(MemoryLedger::new()),
        Arc::new(catalog),
        config.settings(),
    )))
}

pub(crate) fn parse_month(raw: &str) -> Result<YearMonth, String> {
    raw.parse()
}
