//! One training cycle: read every profile's search history from the Profile
//! Store and persist a fresh recommendation model per profile.

use search_core::profile::{ProfileError, ProfileQueries, ProfileStore};
use search_core::recommend::ModelRecord;
use search_core::schedule::{run_periodically, CycleOutcome};
use search_core::ModelStore;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrainReport {
    pub profiles: usize,
    pub trained: usize,
    /// Profiles with no visited URL yet; nothing to learn from.
    pub skipped: usize,
    pub failed: usize,
}

pub fn fit_profile(profile_id: i64, queries: &[ProfileQueries]) -> Option<ModelRecord> {
    let rows = queries
        .iter()
        .filter_map(|q| q.visited_urls.as_deref().map(|urls| (q.body.as_str(), urls)));
    ModelRecord::fit(profile_id, rows)
}

pub async fn train(profiles: &dyn ProfileStore, models: &dyn ModelStore) -> Result<TrainReport, ProfileError> {
    let listing = profiles.list_profiles().await?;
    let mut report = TrainReport { profiles: listing.len(), ..Default::default() };

    for (profile_id, queries) in &listing {
        let Some(model) = fit_profile(*profile_id, queries) else {
            report.skipped += 1;
            continue;
        };
        match models.set(&model) {
            Ok(()) => {
                report.trained += 1;
                tracing::debug!(profile_id, rows = model.training.len(), "model saved");
            }
            Err(e) => {
                report.failed += 1;
                tracing::error!(profile_id, error = %e, "could not save model");
            }
        }
    }
    Ok(report)
}

pub async fn train_once(profiles: &dyn ProfileStore, models: &dyn ModelStore) -> CycleOutcome {
    match train(profiles, models).await {
        Ok(report) if report.failed == 0 => {
            tracing::info!(profiles = report.profiles, trained = report.trained, skipped = report.skipped, "training done");
            CycleOutcome::Completed
        }
        Ok(report) => CycleOutcome::Retryable(format!("{} of {} models could not be saved", report.failed, report.profiles)),
        Err(e) => CycleOutcome::Retryable(format!("listing profiles failed: {e}")),
    }
}

/// Train now, then once every `period`.
pub async fn run_forever(profiles: Arc<dyn ProfileStore>, models: Arc<dyn ModelStore>, period: Duration) {
    let (profiles, models) = (profiles.as_ref(), models.as_ref());
    run_periodically("trainer", period, period, move || train_once(profiles, models)).await
}
