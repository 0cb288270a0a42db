use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::clamp_concurrency;
use crate::errors::ErrorKind;
use crate::generation::{GenerationResult, TrailGenerator};
use crate::journal::{RunEvent, RunJournal};
use crate::regions::RegionEnumerator;
use crate::settings::{last_summary_key, SettingsStore};
use crate::store::{TrailStore, UpsertOutcome};

pub const MIN_LIMIT_PER_REGION: usize = 5;
pub const MAX_LIMIT_PER_REGION: usize = 30;
const DEFAULT_CONCURRENCY: usize = 3;

pub fn clamp_limit(limit: usize) -> usize {
    limit.clamp(MIN_LIMIT_PER_REGION, MAX_LIMIT_PER_REGION)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionFailure {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub country_code: String,
    pub limit_per_region: usize,
    pub regions_total: usize,
    pub regions_processed: usize,
    pub trails_created: usize,
    pub trails_skipped: usize,
    pub trails_rejected: usize,
    pub errors: BTreeMap<String, RegionFailure>,
    pub total_cost_usd: f64,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ImportSummary {
    fn begin(country_code: String, limit_per_region: usize, regions_total: usize) -> Self {
        let now = Utc::now();
        Self {
            country_code,
            limit_per_region,
            regions_total,
            regions_processed: 0,
            trails_created: 0,
            trails_skipped: 0,
            trails_rejected: 0,
            errors: BTreeMap::new(),
            total_cost_usd: 0.0,
            cancelled: false,
            started_at: now,
            finished_at: now,
        }
    }

    pub fn trails_returned(&self) -> usize {
        self.trails_created + self.trails_skipped + self.trails_rejected
    }
}

#[derive(Debug, Default)]
struct RegionTally {
    created: usize,
    skipped: usize,
    rejected: usize,
    store_fault: Option<String>,
}

pub struct ImportOrchestrator {
    regions: RegionEnumerator,
    generator: Arc<dyn TrailGenerator>,
    store: Arc<dyn TrailStore>,
    concurrency: usize,
    journal: Option<RunJournal>,
    settings: Option<SettingsStore>,
}

impl ImportOrchestrator {
    pub fn new(
        regions: RegionEnumerator,
        generator: Arc<dyn TrailGenerator>,
        store: Arc<dyn TrailStore>,
    ) -> Self {
        Self {
            regions,
            generator,
            store,
            concurrency: DEFAULT_CONCURRENCY,
            journal: None,
            settings: None,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = clamp_concurrency(concurrency);
        self
    }

    pub fn with_journal(mut self, journal: RunJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn with_settings(mut self, settings: SettingsStore) -> Self {
        self.settings = Some(settings);
        self
    }

    pub async fn run(&self, country_code: &str, limit_per_region: usize) -> ImportSummary {
        self.run_with_cancel(country_code, limit_per_region, None)
            .await
    }

    pub async fn run_with_cancel(
        &self,
        country_code: &str,
        limit_per_region: usize,
        cancel: Option<Arc<AtomicBool>>,
    ) -> ImportSummary {
        let limit = clamp_limit(limit_per_region);
        let country = country_code.trim().to_ascii_uppercase();
        let regions = self.regions.list_regions(&country, limit);
        let mut summary = ImportSummary::begin(country.clone(), limit, regions.len());

        info!(
            target: "import",
            country = %country,
            limit,
            regions = regions.len(),
            concurrency = self.concurrency,
            "starting trail import"
        );
        self.journal_event(RunEvent::RunStarted {
            country_code: country.clone(),
            limit_per_region: limit,
            regions_total: regions.len(),
            concurrency: self.concurrency,
        });

        let is_cancelled = || {
            cancel
                .as_ref()
                .map(|flag| flag.load(Ordering::SeqCst))
                .unwrap_or(false)
        };

        let mut pending = regions.into_iter();
        let mut in_flight = FuturesUnordered::new();
        loop {
            while in_flight.len() < self.concurrency && !is_cancelled() {
                let Some(region) = pending.next() else {
                    break;
                };
                let generator = Arc::clone(&self.generator);
                in_flight.push(async move {
                    let result = generator.generate(&region).await;
                    (region, result)
                });
            }

            let Some((region, result)) = in_flight.next().await else {
                break;
            };
            summary.regions_processed += 1;
            match result {
                Ok(generation) => self.merge(&mut summary, generation).await,
                Err(err) => {
                    let cost_usd = err.cost_usd();
                    summary.total_cost_usd += cost_usd;
                    warn!(
                        target: "import",
                        region = %region.id,
                        kind = err.kind().as_str(),
                        error = %err,
                        cost_usd,
                        "region generation failed"
                    );
                    self.journal_event(RunEvent::RegionFailed {
                        region: region.id.clone(),
                        kind: err.kind(),
                        message: err.to_string(),
                        cost_usd,
                    });
                    summary.errors.insert(
                        region.id,
                        RegionFailure {
                            kind: err.kind(),
                            message: err.to_string(),
                        },
                    );
                }
            }
        }

        summary.cancelled = pending.len() > 0;
        summary.finished_at = Utc::now();
        self.finish(&summary);
        summary
    }

    async fn merge(&self, summary: &mut ImportSummary, generation: GenerationResult) {
        let GenerationResult {
            region,
            trails,
            returned,
            rejected,
            cost_usd,
        } = generation;

        let mut tally = RegionTally {
            rejected,
            ..RegionTally::default()
        };
        for mut candidate in trails {
            candidate.is_seed = false;
            let key = candidate.natural_key();
            let existing = match self.store.find_by_natural_key(&key).await {
                Ok(existing) => existing,
                Err(err) => {
                    tally.rejected += 1;
                    tally.store_fault.get_or_insert_with(|| err.to_string());
                    continue;
                }
            };
            if existing.is_some() {
                tally.skipped += 1;
                continue;
            }
            match self.store.upsert(candidate).await {
                Ok(UpsertOutcome::Created(_)) => tally.created += 1,
                Ok(UpsertOutcome::Existing(_)) => tally.skipped += 1,
                Err(err) => {
                    tally.rejected += 1;
                    tally.store_fault.get_or_insert_with(|| err.to_string());
                }
            }
        }

        summary.trails_created += tally.created;
        summary.trails_skipped += tally.skipped;
        summary.trails_rejected += tally.rejected;
        summary.total_cost_usd += cost_usd;

        if let Some(message) = tally.store_fault.take() {
            warn!(
                target: "import",
                region = %region.id,
                error = %message,
                "store rejected generated trails"
            );
            summary.errors.insert(
                region.id.clone(),
                RegionFailure {
                    kind: ErrorKind::StoreError,
                    message,
                },
            );
        }

        info!(
            target: "import",
            region = %region.id,
            returned,
            created = tally.created,
            skipped = tally.skipped,
            rejected = tally.rejected,
            cost_usd,
            "region merged"
        );
        self.journal_event(RunEvent::RegionCompleted {
            region: region.id,
            returned,
            created: tally.created,
            skipped: tally.skipped,
            rejected: tally.rejected,
            cost_usd,
        });
    }

    fn finish(&self, summary: &ImportSummary) {
        info!(
            target: "import",
            country = %summary.country_code,
            processed = summary.regions_processed,
            created = summary.trails_created,
            skipped = summary.trails_skipped,
            rejected = summary.trails_rejected,
            failed = summary.errors.len(),
            cost_usd = summary.total_cost_usd,
            cancelled = summary.cancelled,
            "trail import finished"
        );

        self.journal_event(RunEvent::RunFinished {
            country_code: summary.country_code.clone(),
            regions_processed: summary.regions_processed,
            trails_created: summary.trails_created,
            trails_skipped: summary.trails_skipped,
            trails_rejected: summary.trails_rejected,
            failed_regions: summary.errors.len(),
            total_cost_usd: summary.total_cost_usd,
            cancelled: summary.cancelled,
        });
        if let Some(journal) = &self.journal {
            if let Err(err) = journal.flush() {
                warn!(target: "import", error = ?err, "failed to flush run journal");
            }
        }

        if let Some(settings) = &self.settings {
            let key = last_summary_key(&summary.country_code);
            if let Err(err) = settings.set_json(&key, summary) {
                warn!(target: "import", key = %key, error = ?err, "failed to persist run summary");
            }
        }
    }

    fn journal_event(&self, event: RunEvent) {
        let Some(journal) = &self.journal else {
            return;
        };
        let name = event.name();
        if let Err(err) = journal.record(event) {
            warn!(target: "import", event = name, error = ?err, "failed to journal run event");
        }
    }
}
