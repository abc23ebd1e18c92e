//! Upstream opportunity source trait.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Opportunity, OpportunityQuery};

/// One call to an upstream opportunity API.
///
/// Return `FleetFlowError::UpstreamThrottled` for a 429 answer and
/// `FleetFlowError::Upstream` for any other non-2xx or transport failure.
#[async_trait]
pub trait OpportunitySource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, query: &OpportunityQuery) -> Result<Vec<Opportunity>>;
}
