//! Retrieval plugins that ground agent answers in a knowledge source
//!
//! A [`RetrievalPlugin`] wraps a [`SearchBackend`] and formats its hits into a
//! single context blob: each snippet prefixed with `Document: `, joined by a
//! blank line, or the literal `No results found` when nothing matched.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::config::SearchSettings;
use crate::error::{CouncilError, Result};

/// Returned by [`RetrievalPlugin::search`] when the backend has no hits
pub const NO_RESULTS: &str = "No results found";

/// Vector field queried on every index
const VECTOR_FIELD: &str = "text_vector";

/// A ranked snippet source
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Up to `top_k` snippets, best first
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<String>>;

    fn source_name(&self) -> &str;
}

/// Named retrieval capability attached to an agent
#[derive(Clone)]
pub struct RetrievalPlugin {
    pub name: String,
    pub description: String,
    backend: Arc<dyn SearchBackend>,
}

impl RetrievalPlugin {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        backend: Arc<dyn SearchBackend>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            backend,
        }
    }

    /// Search the backend and format the hits as one context string
    #[instrument(skip(self), fields(plugin = %self.name))]
    pub async fn search(&self, query: &str, top_k: usize) -> Result<String> {
        let hits = self.backend.search(query, top_k).await?;
        debug!(
            source = self.backend.source_name(),
            hits = hits.len(),
            "Retrieval complete"
        );
        Ok(format_hits(hits.into_iter().take(top_k)))
    }
}

fn format_hits(hits: impl Iterator<Item = String>) -> String {
    let contexts: Vec<String> = hits.map(|hit| format!("Document: {hit}")).collect();
    if contexts.is_empty() {
        NO_RESULTS.to_string()
    } else {
        contexts.join("\n\n")
    }
}

/// Azure AI Search index queried by vectorizing the query text server-side
pub struct AzureSearchBackend {
    client: reqwest::Client,
    url: String,
    api_key: String,
    index: String,
}

impl AzureSearchBackend {
    pub fn new(
        client: reqwest::Client,
        settings: &SearchSettings,
        index: impl Into<String>,
    ) -> Self {
        let index = index.into();
        let url = format!(
            "{}/indexes/{}/docs/search?api-version={}",
            settings.endpoint.trim_end_matches('/'),
            index,
            settings.api_version
        );
        Self {
            client,
            url,
            api_key: settings.api_key.clone(),
            index,
        }
    }

    fn request_body(query: &str, top_k: usize) -> Value {
        json!({
            "vectorQueries": [{
                "kind": "text",
                "text": query,
                "k": top_k,
                "fields": VECTOR_FIELD
            }],
            "top": top_k
        })
    }
}

#[async_trait]
impl SearchBackend for AzureSearchBackend {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<String>> {
        let response = self
            .client
            .post(&self.url)
            .header("api-key", &self.api_key)
            .json(&Self::request_body(query, top_k))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(CouncilError::upstream(
                "Azure AI Search",
                format!("{} {status}: {text}", self.index),
            ));
        }

        let results: SearchResponse = response.json().await?;
        Ok(results.value.iter().map(document_text).collect())
    }

    fn source_name(&self) -> &str {
        &self.index
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    value: Vec<Value>,
}

/// `content`, else `text`, else the whole document as JSON
fn document_text(doc: &Value) -> String {
    ["content", "text"]
        .iter()
        .filter_map(|field| doc.get(*field).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| doc.to_string())
}

/// Fixed in-memory table returned whole for every query
pub struct StaticTable {
    name: String,
    data: String,
}

impl StaticTable {
    pub fn new(name: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: data.into().trim().to_string(),
        }
    }

    /// Order-velocity threshold metrics for Life Sciences accounts
    pub fn thresholds() -> Self {
        Self::new("threshold", THRESHOLD_CSV)
    }
}

#[async_trait]
impl SearchBackend for StaticTable {
    async fn search(&self, _query: &str, top_k: usize) -> Result<Vec<String>> {
        if self.data.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        Ok(vec![self.data.clone()])
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

const THRESHOLD_CSV: &str = "
as_of_date,order_created_year_quarter,primary_group,product_division_code,business_segment_code,account_name,nba_hier_level,nba_name,nba_child,threshold_value,threshold_deviation,nba_child_metrics_value,relative_benchmark_value,unit_of_measure,recommendation_type,ord_grp,company_region,company_sub_region
2025-02-01 13:48:43,Q1-2025,Life Sciences,-,-,ARSENAL BIOSCIENCES,primary_group,Improve Order Velocity,% of Orders on hold,0.1500,0.0038,0.1538,,%,Absolute,1,NA,-
2025-02-01 13:48:43,Q1-2025,Life Sciences,-,-,ARUP,primary_group,Improve Order Velocity,% of Orders on hold,0.1500,0.2406,0.3906,,%,Absolute,1,NA,-
2025-02-01 13:48:43,Q1-2025,Life Sciences,-,-,BIOGEN,primary_group,Improve Order Velocity,Average hold duration,10.0000,1.5600,11.5600,,days,Absolute,1,NA,-
2025-02-01 13:48:43,Q1-2025,Life Sciences,-,-,BMS,primary_group,Improve Order Velocity,% of Orders on hold,0.1500,0.3467,0.4967,,%,Absolute,1,NA,-
2025-02-01 13:48:43,Q1-2025,Life Sciences,-,-,CATALENT,primary_group,Improve Order Velocity,% of Orders on hold,0.1500,0.1912,0.3412,,%,Absolute,1,NA,-
2025-02-01 13:48:43,Q1-2025,Life Sciences,-,-,CEDARS SINAI,primary_group,Improve Order Velocity,% of Orders on hold,0.1500,0.2506,0.4006,,%,Absolute,1,NA,-
2025-02-01 13:48:43,Q1-2025,Life Sciences,-,-,CSL LTD,primary_group,Improve Order Velocity,% of Orders on hold,0.1500,0.0328,0.1828,,%,Absolute,1,NA,-
";
