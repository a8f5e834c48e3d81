//! Offset pagination over the claim search endpoint for one account.

use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::errors::FetchError;
use crate::marketplace::model::ClaimSummary;
use crate::marketplace::{ClaimSearch, MarketplaceApi};
use crate::model::DateRange;

#[derive(Clone)]
pub struct ClaimsLister {
    api: Arc<dyn MarketplaceApi>,
    page_size: u32,
    max_pages: u32,
}

impl ClaimsLister {
    pub fn new(api: Arc<dyn MarketplaceApi>, page_size: u32, max_pages: u32) -> Self {
        Self {
            api,
            page_size: page_size.max(1),
            max_pages: max_pages.max(1),
        }
    }

    /// Every claim of `seller_id` created within `range`, in listing order and
    /// without duplicate ids. The date filter is applied by the remote API
    /// only. Any page failure aborts the listing.
    #[instrument(skip(self, token, range), fields(from = %range.from, to = %range.to))]
    pub async fn list_claims(
        &self,
        seller_id: &str,
        token: &str,
        range: &DateRange,
    ) -> Result<Vec<Value>, FetchError> {
        let mut claims = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut offset: u32 = 0;

        for page_no in 0..self.max_pages {
            let query = ClaimSearch {
                seller_id,
                date_from: range.from,
                date_to: range.to,
                offset,
                limit: self.page_size,
            };
            let page = self.api.search_claims(&query, token).await?;
            let rows = page.results.len();

            let mut fresh = 0usize;
            for claim in page.results {
                let Some(summary) = ClaimSummary::from_payload(&claim) else {
                    debug!("skipping listed claim without id");
                    continue;
                };
                if seen.insert(summary.id) {
                    fresh += 1;
                    claims.push(claim);
                }
            }
            debug!(page = page_no, rows, fresh, "claims page");

            if rows < self.page_size as usize {
                break;
            }
            if fresh == 0 {
                warn!(offset, "full page without new claims, stopping");
                break;
            }
            if page_no + 1 == self.max_pages {
                warn!(max_pages = self.max_pages, "page cap reached, listing truncated");
            }
            offset = offset.saturating_add(self.page_size);
        }

        info!(claims = claims.len(), "listing complete");
        Ok(claims)
    }
}
