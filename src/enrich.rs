//! Two-stage enrichment of listed claims with bounded fan-out.
//!
//! Stage one keeps only claims whose return reached an active phase. Stage two
//! attaches the order, message thread, product and shipment history of each
//! survivor. Every sub-call is soft: a failure leaves its field empty.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::marketplace::model::{ClaimSummary, OrderRefs, ReturnSummary};
use crate::marketplace::MarketplaceApi;

/// Runs async work in consecutive batches of at most `batch_size` items.
/// A batch starts only after the previous one has fully completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchRunner {
    batch_size: usize,
}

impl BatchRunner {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Apply `f` to every item; results keep the input order.
    pub async fn run<T, R, F, Fut>(&self, items: Vec<T>, f: F) -> Vec<R>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = R>,
    {
        let mut out = Vec::with_capacity(items.len());
        for batch in self.split(items) {
            out.extend(join_all(batch.into_iter().map(&f)).await);
        }
        out
    }

    /// Consecutive batches of the input, in order.
    pub fn split<T>(&self, items: Vec<T>) -> Vec<Vec<T>> {
        let mut batches = Vec::with_capacity(items.len().div_ceil(self.batch_size));
        let mut items = items.into_iter().peekable();
        while items.peek().is_some() {
            batches.push(items.by_ref().take(self.batch_size).collect());
        }
        batches
    }
}

/// An order with its shipment history written back onto it.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedOrder {
    pub payload: Value,
    pub shipment_history: Option<Value>,
}

/// A listed claim plus every dependent resource that could be fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedClaim {
    pub claim_id: String,
    pub claim: Value,
    pub return_details: Option<Value>,
    pub order: Option<EnrichedOrder>,
    pub messages: Option<Value>,
    pub product: Option<Value>,
    pub reason: Option<Value>,
    pub seller: Option<Value>,
    pub fetched_at: DateTime<Utc>,
}

/// Outcome of one enrichment run.
#[derive(Debug, Clone, PartialEq)]
pub struct Enrichment {
    pub claims: Vec<EnrichedClaim>,
    /// Listed claims dropped by the return-activity filter.
    pub inactive: usize,
}

struct Survivor {
    summary: ClaimSummary,
    claim: Value,
    return_details: Value,
}

#[derive(Clone)]
pub struct EnrichmentOrchestrator {
    api: Arc<dyn MarketplaceApi>,
    runner: BatchRunner,
}

impl EnrichmentOrchestrator {
    pub fn new(api: Arc<dyn MarketplaceApi>, runner: BatchRunner) -> Self {
        Self { api, runner }
    }

    #[instrument(skip_all, fields(listed = raw.len()))]
    pub async fn enrich(&self, raw: Vec<Value>, seller_id: &str, token: &str) -> Enrichment {
        let fetched_at = Utc::now();
        let listed = raw.len();

        let survivors = self.filter_active(raw, token).await;
        let inactive = listed - survivors.len();
        info!(active = survivors.len(), inactive, "return-activity filter applied");

        let reasons = self.reasons(&survivors, token).await;
        let seller = self.api.seller(seller_id, token).await;

        let mut claims = Vec::with_capacity(survivors.len());
        for batch in self.runner.split(survivors) {
            claims.extend(self.enrich_batch(batch, token).await.into_iter().map(
                |(survivor, order, messages, product)| EnrichedClaim {
                    reason: survivor
                        .summary
                        .reason_id
                        .as_ref()
                        .and_then(|id| reasons.get(id).cloned()),
                    claim_id: survivor.summary.id,
                    claim: survivor.claim,
                    return_details: Some(survivor.return_details),
                    order,
                    messages,
                    product,
                    seller: seller.clone(),
                    fetched_at,
                },
            ));
        }
        Enrichment { claims, inactive }
    }

    /// Stage one: fetch return details and keep claims with an active return.
    async fn filter_active(&self, raw: Vec<Value>, token: &str) -> Vec<Survivor> {
        let api = &*self.api;
        let checked = self
            .runner
            .run(raw, |claim| async move {
                let summary = ClaimSummary::from_payload(&claim)?;
                let details = api.return_details(&summary.id, token).await?;
                ReturnSummary::from_payload(&details)
                    .is_active()
                    .then_some(Survivor {
                        summary,
                        claim,
                        return_details: details,
                    })
            })
            .await;
        checked.into_iter().flatten().collect()
    }

    /// Reason detail, fetched once per distinct reason id.
    async fn reasons(&self, survivors: &[Survivor], token: &str) -> HashMap<String, Value> {
        let mut ids: Vec<String> = Vec::new();
        for id in survivors.iter().filter_map(|s| s.summary.reason_id.as_ref()) {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        let api = &*self.api;
        self.runner
            .run(ids, |id| async move {
                let reason = api.reason(&id, token).await;
                reason.map(|r| (id, r))
            })
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// Stage two for one batch: order and messages in parallel per claim, the
    /// product once the order names an item, then shipment history for every
    /// order of the batch that names a shipment.
    async fn enrich_batch(
        &self,
        batch: Vec<Survivor>,
        token: &str,
    ) -> Vec<(Survivor, Option<EnrichedOrder>, Option<Value>, Option<Value>)> {
        let api = &*self.api;
        let primary = join_all(batch.into_iter().map(|survivor| async move {
            let order_id = survivor.summary.order_id.clone().or_else(|| {
                ReturnSummary::from_payload(&survivor.return_details).order_id
            });
            let order_call = async {
                match order_id.as_deref() {
                    Some(id) => api.order(id, token).await,
                    None => None,
                }
            };
            let (order, messages) =
                tokio::join!(order_call, api.messages(&survivor.summary.id, token));

            let refs = order.as_ref().map(OrderRefs::from_payload).unwrap_or_default();
            let product = match refs.item_id.as_deref() {
                Some(item_id) => api.item(item_id, token).await,
                None => None,
            };
            (survivor, order, refs.shipment_id, messages, product)
        }))
        .await;

        join_all(primary.into_iter().map(
            |(survivor, order, shipment_id, messages, product)| async move {
                let order = match order {
                    Some(payload) => {
                        let shipment_history = match shipment_id.as_deref() {
                            Some(id) => api.shipment_history(id, token).await,
                            None => None,
                        };
                        Some(EnrichedOrder {
                            payload,
                            shipment_history,
                        })
                    }
                    None => {
                        debug!(claim_id = %survivor.summary.id, "claim enriched without order");
                        None
                    }
                };
                (survivor, order, messages, product)
            },
        ))
        .await
    }
}
