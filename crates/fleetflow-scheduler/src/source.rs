//! HTTP opportunity source — GET with date range, category and keywords,
//! JSON array (or wrapped array) back.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use fleetflow_core::config::SourceConfig;
use fleetflow_core::error::{FleetFlowError, Result};
use fleetflow_core::traits::OpportunitySource;
use fleetflow_core::types::{Opportunity, OpportunityQuery};
use serde::Deserialize;

/// Upstream opportunity API over HTTP.
pub struct HttpOpportunitySource {
    name: String,
    config: SourceConfig,
    client: reqwest::Client,
}

impl HttpOpportunitySource {
    pub fn new(name: &str, config: SourceConfig) -> Self {
        Self {
            name: name.to_string(),
            config,
            client: reqwest::Client::new(),
        }
    }

    fn query_params(&self, query: &OpportunityQuery) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("postedFrom", query.posted_from.format("%Y-%m-%d").to_string()),
            ("postedTo", query.posted_to.format("%Y-%m-%d").to_string()),
        ];
        if let Some(category) = &query.category {
            params.push(("category", category.clone()));
        }
        if !query.keywords.is_empty() {
            params.push(("keywords", query.keywords.join(",")));
        }
        if let Some(limit) = query.limit.or(self.config.limit) {
            params.push(("limit", limit.to_string()));
        }
        if !self.config.api_key.is_empty() {
            params.push(("api_key", self.config.api_key.clone()));
        }
        params
    }
}

#[async_trait]
impl OpportunitySource for HttpOpportunitySource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, query: &OpportunityQuery) -> Result<Vec<Opportunity>> {
        let resp = self
            .client
            .get(&self.config.base_url)
            .query(&self.query_params(query))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| FleetFlowError::Upstream(format!("{} request failed: {e}", self.name)))?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(FleetFlowError::UpstreamThrottled);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(FleetFlowError::Upstream(format!("{} returned {status}: {snippet}", self.name)));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| FleetFlowError::Upstream(format!("{} body read failed: {e}", self.name)))?;
        parse_opportunities(&body, &self.config.source_system)
    }
}

/// Accepts a bare array or `{ "opportunities": [...] }` / `{ "opportunitiesData": [...] }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireBody {
    List(Vec<WireOpportunity>),
    Wrapped {
        #[serde(alias = "opportunitiesData", alias = "data")]
        opportunities: Vec<WireOpportunity>,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireOpportunity {
    #[serde(alias = "noticeId")]
    id: String,
    title: String,
    #[serde(default)]
    posted_date: Option<String>,
    #[serde(default, alias = "responseDeadLine")]
    response_deadline: Option<String>,
    #[serde(default, alias = "amount")]
    estimated_value: Option<f64>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, alias = "fullParentPathName")]
    agency: Option<String>,
    #[serde(default, alias = "naicsCode")]
    category: Option<String>,
    #[serde(default, alias = "uiLink")]
    url: Option<String>,
}

/// Decode an upstream body. Malformed JSON is an upstream error (retryable).
pub fn parse_opportunities(body: &str, source_system: &str) -> Result<Vec<Opportunity>> {
    let wire: WireBody = serde_json::from_str(body)
        .map_err(|e| FleetFlowError::Upstream(format!("invalid opportunity payload: {e}")))?;
    let items = match wire {
        WireBody::List(items) => items,
        WireBody::Wrapped { opportunities } => opportunities,
    };
    Ok(items
        .into_iter()
        .map(|w| Opportunity {
            id: w.id,
            title: w.title,
            posted_date: w.posted_date.as_deref().and_then(parse_date),
            response_deadline: w.response_deadline.as_deref().and_then(parse_deadline),
            estimated_value: w.estimated_value,
            source_system: source_system.to_string(),
            description: w.description,
            agency: w.agency,
            category: w.category,
            url: w.url,
        })
        .collect())
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| NaiveDate::parse_from_str(s, "%m/%d/%Y").ok())
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|d| d.date_naive()))
}

/// Date-only deadlines close at the end of that day (UTC).
fn parse_deadline(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt.with_timezone(&Utc));
    }
    let end_of_day = NaiveTime::from_hms_opt(23, 59, 59)?;
    parse_date(s).map(|d| d.and_time(end_of_day).and_utc())
}
