//! Image resolution resolver
//!
//! Upgrades an [`ImageRef`]'s candidates to the maximum resolution the image
//! server actually serves. The descriptor path (IIIF `info.json`) is
//! preferred when a candidate matches an image-service shape; otherwise
//! tiers are probed with HEAD requests from highest to lowest. A ref whose
//! tiers all fail to confirm is resolved degraded to the lowest-confidence
//! candidate rather than failed: missing full resolution must not sink the
//! record.
//!
//! All network traffic (descriptor fetches and probes) goes through the
//! scheduler, so resolution obeys the same per-host politeness as page
//! fetches.

pub mod tiers;

use crate::fetch::Scheduler;
use crate::model::{FetchTask, ImageRef, ImageStatus, TaskKind, TaskRole};
use std::sync::Arc;
use url::Url;

/// Selects the maximum servable image variant for pending refs
pub struct Resolver {
    scheduler: Arc<Scheduler>,
}

impl Resolver {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self { scheduler }
    }

    /// Resolves a pending ref; refs in any other state pass through untouched
    pub async fn resolve(&self, archive: &str, mut image: ImageRef) -> ImageRef {
        if image.status != ImageStatus::Pending {
            return image;
        }

        let Some(best) = image.best_candidate().map(str::to_string) else {
            // nothing to work with
            let _ = image.mark_failed();
            return image;
        };

        // Primary path: a capability descriptor names the exact maximum.
        if let Some(service_base) = tiers::iiif_service_base(&best) {
            if let Some(max_url) = self.try_descriptor(archive, &service_base).await {
                tracing::debug!("Resolved {} via descriptor: {}", best, max_url);
                let _ = image.mark_resolved(max_url, false);
                return image;
            }
        }

        // Fallback path: probe tiers from highest to lowest.
        let ladder = tiers::tier_ladder(&best);
        let probe_order: Vec<String> = if ladder.is_empty() {
            image.candidate_urls.iter().rev().cloned().collect()
        } else {
            ladder.into_iter().rev().collect()
        };

        for candidate in &probe_order {
            if self.probe(archive, candidate).await {
                tracing::debug!("Resolved {} via probe: {}", best, candidate);
                let _ = image.mark_resolved(candidate.clone(), false);
                return image;
            }
        }

        // Nothing confirmed servable: degrade instead of failing.
        match image.fallback_candidate().map(str::to_string) {
            Some(fallback) => {
                tracing::debug!("No tier confirmed for {}, degrading to {}", best, fallback);
                let _ = image.mark_resolved(fallback, true);
            }
            None => {
                let _ = image.mark_failed();
            }
        }
        image
    }

    /// Fetches and interprets the service descriptor, if it exists
    async fn try_descriptor(&self, archive: &str, service_base: &str) -> Option<String> {
        let info = tiers::info_url(service_base);
        let url = Url::parse(&info).ok()?;
        let task = FetchTask::new(url, archive, TaskKind::Descriptor, TaskRole::Detail);

        let outcome = self.scheduler.submit(task).await;
        let page = outcome.result.ok()?;
        let descriptor: serde_json::Value = serde_json::from_slice(&page.bytes).ok()?;
        tiers::max_url_from_descriptor(service_base, &descriptor)
    }

    /// Lightweight existence probe; true when the server confirms the tier
    async fn probe(&self, archive: &str, candidate: &str) -> bool {
        let Ok(url) = Url::parse(candidate) else {
            return false;
        };
        let task = FetchTask::new(url, archive, TaskKind::Probe, TaskRole::Detail);
        self.scheduler.submit(task).await.is_success()
    }
}
