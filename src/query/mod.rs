//! Query Service
//!
//! Read side of CQRS: serves queries exclusively from projections, never
//! from the event store. Reads are eventually consistent; staleness is
//! bounded by the projection engine's consumption lag.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::AccountStatus;
use crate::projection::{AccountSummary, AccountSummaryProjection};

/// Query errors
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Account not found: {0}")]
    NotFound(Uuid),
}

/// Filter for account listings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountFilter {
    /// Only accounts with this status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AccountStatus>,

    /// Only accounts whose holder name contains this substring
    /// (case-insensitive)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holder_contains: Option<String>,
}

impl AccountFilter {
    fn matches(&self, summary: &AccountSummary) -> bool {
        if let Some(status) = self.status {
            if summary.status != status {
                return false;
            }
        }

        if let Some(needle) = &self.holder_contains {
            let haystack = summary.holder_name.to_lowercase();
            if !haystack.contains(&needle.to_lowercase()) {
                return false;
            }
        }

        true
    }
}

/// Serves account queries from the summary projection
pub struct QueryService {
    summaries: Arc<AccountSummaryProjection>,
}

impl QueryService {
    pub fn new(summaries: Arc<AccountSummaryProjection>) -> Self {
        Self { summaries }
    }

    /// Look up one account summary
    pub async fn get_account(&self, account_id: Uuid) -> Result<AccountSummary, QueryError> {
        self.summaries
            .get(account_id)
            .await
            .ok_or(QueryError::NotFound(account_id))
    }

    /// List account summaries matching the filter, ordered by holder name
    /// then account ID for a stable listing
    pub async fn list_accounts(&self, filter: &AccountFilter) -> Vec<AccountSummary> {
        let mut accounts: Vec<AccountSummary> = self
            .summaries
            .all()
            .await
            .into_iter()
            .filter(|summary| filter.matches(summary))
            .collect();

        accounts.sort_by(|a, b| {
            a.holder_name
                .cmp(&b.holder_name)
                .then_with(|| a.account_id.cmp(&b.account_id))
        });
        accounts
    }
}
