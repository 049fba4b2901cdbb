// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

//! One request per variable, stamped with the generation of its cycle.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::data::{Generation, RawCategory, VariableKind, VariableSpec};
use crate::error::{FetchError, FetchFailure};
use crate::selection::SiteSelection;

pub const DEFAULT_VARIABLE_ENDPOINT: &str = "/dendro/dynamicchart";
pub const DEFAULT_SAMPLE_ENDPOINT: &str = "/site/sampletypes";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest response body kept in a [`FetchError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// Port for the backend. Implementations return the raw response body of a
/// successful (2xx) request.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post_json(&self, path: &str, body: &Value) -> Result<String, FetchError>;
}

/// [`Transport`] over HTTP.
#[derive(Clone)]
pub struct HttpTransport {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(&self, path: &str, body: &Value) -> Result<String, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        let network = |e: reqwest::Error| {
            if e.is_timeout() {
                FetchError::Timeout {
                    endpoint: path.to_string(),
                    timeout: self.timeout,
                }
            } else {
                FetchError::Network {
                    endpoint: path.to_string(),
                    message: e.to_string(),
                }
            }
        };

        let resp = self.client.post(&url).json(body).send().await.map_err(network)?;
        let status = resp.status();
        let text = resp.text().await.map_err(network)?;

        if !status.is_success() {
            return Err(FetchError::Status {
                endpoint: path.to_string(),
                status: status.as_u16(),
                body: text.chars().take(MAX_ERROR_BODY).collect(),
            });
        }
        Ok(text)
    }
}

/// Backend paths per variable kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub variable: String,
    pub sample_total: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            variable: DEFAULT_VARIABLE_ENDPOINT.to_string(),
            sample_total: DEFAULT_SAMPLE_ENDPOINT.to_string(),
        }
    }
}

impl Endpoints {
    fn for_spec(&self, spec: &VariableSpec) -> String {
        match (&spec.endpoint, spec.kind) {
            (Some(endpoint), _) => endpoint.clone(),
            (None, VariableKind::SampleTotal) => self.sample_total.clone(),
            (None, _) => self.variable.clone(),
        }
    }
}

/// A successful fetch. `categories` is `None` when the backend answered
/// without any usable records.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableResponse {
    pub variable: String,
    pub generation: Generation,
    pub categories: Option<Vec<RawCategory>>,
}

#[derive(Clone)]
pub struct VariableFetcher {
    transport: Arc<dyn Transport>,
    endpoints: Endpoints,
    timeout: Duration,
}

impl VariableFetcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            endpoints: Endpoints::default(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fetch one variable for the sites selected right now.
    ///
    /// The fetcher only stamps `generation` on the result; deciding whether
    /// the result is stale is up to the caller.
    pub async fn fetch(
        &self,
        spec: &VariableSpec,
        selection: &SiteSelection,
        generation: Generation,
    ) -> Result<VariableResponse, FetchFailure> {
        let endpoint = self.endpoints.for_spec(spec);
        let sites = selection.current();
        let body = match spec.kind {
            VariableKind::SampleTotal => json!({
                "sites": *sites,
                "requestId": generation,
            }),
            _ => json!({
                "sites": *sites,
                "requestId": generation,
                "variable": spec.name,
            }),
        };

        debug!(
            variable = %spec.name,
            endpoint = %endpoint,
            generation = %generation,
            sites = sites.len(),
            "fetching variable"
        );

        let outcome = tokio::time::timeout(self.timeout, self.transport.post_json(&endpoint, &body))
            .await
            .unwrap_or_else(|_| {
                Err(FetchError::Timeout {
                    endpoint: endpoint.clone(),
                    timeout: self.timeout,
                })
            });

        let text = outcome.map_err(|error| {
            warn!(variable = %spec.name, generation = %generation, error = %error, "fetch failed");
            FetchFailure {
                variable: spec.name.clone(),
                generation,
                error,
            }
        })?;

        let categories = extract_categories(&spec.name, &text);
        if categories.is_none() {
            debug!(variable = %spec.name, generation = %generation, "no data in response");
        }

        Ok(VariableResponse {
            variable: spec.name.clone(),
            generation,
            categories,
        })
    }
}

/// Pull the category records out of a response body.
///
/// Accepts a flat array or a `categories` / `histogram` envelope. Anything
/// else, including an empty array, is "no data". Records that do not
/// deserialize are skipped.
pub fn extract_categories(variable: &str, body: &str) -> Option<Vec<RawCategory>> {
    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => {
            warn!(variable = %variable, error = %e, "malformed response body");
            return None;
        }
    };

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map
            .remove("categories")
            .or_else(|| map.remove("histogram"))
        {
            Some(Value::Array(items)) => items,
            _ => return None,
        },
        _ => return None,
    };

    let categories: Vec<RawCategory> = items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<RawCategory>(item) {
            Ok(category) => Some(category),
            Err(e) => {
                debug!(variable = %variable, error = %e, "skipping malformed record");
                None
            }
        })
        .collect();

    (!categories.is_empty()).then_some(categories)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;

    fn fetcher(transport: Arc<ScriptedTransport>) -> VariableFetcher {
        VariableFetcher::new(transport)
    }

    #[test]
    fn extracts_every_envelope() {
        let flat = r#"[{"name": "a", "count": 1}]"#;
        let wrapped = r#"{"categories": [{"name": "a", "count": 1}], "requestId": 3}"#;
        let histogram = r#"{"histogram": [{"startYear": 1600, "endYear": 1650, "datingsNum": 1}]}"#;
        assert_eq!(extract_categories("v", flat), Some(vec![RawCategory::new("a", 1)]));
        assert_eq!(extract_categories("v", wrapped), Some(vec![RawCategory::new("a", 1)]));
        assert_eq!(
            extract_categories("v", histogram),
            Some(vec![RawCategory::new("1600 - 1650", 1)])
        );
    }

    #[test]
    fn missing_or_empty_arrays_are_no_data() {
        assert_eq!(extract_categories("v", "[]"), None);
        assert_eq!(extract_categories("v", r#"{"categories": []}"#), None);
        assert_eq!(extract_categories("v", r#"{"categories": "nope"}"#), None);
        assert_eq!(extract_categories("v", r#"{"rows": []}"#), None);
        assert_eq!(extract_categories("v", "not json"), None);
        assert_eq!(extract_categories("v", r#"[{"bogus": true}]"#), None);
    }

    #[tokio::test]
    async fn body_carries_sites_generation_and_variable() {
        let transport = Arc::new(ScriptedTransport::fixtures([(
            "Tree rings",
            json!({"categories": [{"name": "120", "count": 2}]}),
        )]));
        let selection = SiteSelection::new(vec![4, 9]);
        let spec = VariableSpec::new("Tree rings", VariableKind::Numeric);

        let response = fetcher(transport.clone())
            .fetch(&spec, &selection, Generation::new(5))
            .await
            .unwrap();

        assert_eq!(response.generation, Generation::new(5));
        assert_eq!(response.categories, Some(vec![RawCategory::new("120", 2)]));

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].path, DEFAULT_VARIABLE_ENDPOINT);
        assert_eq!(
            calls[0].body,
            json!({"sites": [4, 9], "requestId": 5, "variable": "Tree rings"})
        );
    }

    #[tokio::test]
    async fn sample_total_uses_its_own_endpoint() {
        let transport = Arc::new(ScriptedTransport::fixtures([(
            DEFAULT_SAMPLE_ENDPOINT,
            json!({"categories": [{"name": "Core", "count": 7}]}),
        )]));
        let spec = VariableSpec::new("Sample types", VariableKind::SampleTotal);

        fetcher(transport.clone())
            .fetch(&spec, &SiteSelection::new(vec![1]), Generation::new(1))
            .await
            .unwrap();

        let calls = transport.calls();
        assert_eq!(calls[0].path, DEFAULT_SAMPLE_ENDPOINT);
        assert_eq!(calls[0].body, json!({"sites": [1], "requestId": 1}));
    }

    #[tokio::test]
    async fn failures_are_stamped_with_variable_and_generation() {
        let transport = Arc::new(ScriptedTransport::fixtures(Vec::<(&str, Value)>::new()));
        let spec = VariableSpec::new("Pith (P)", VariableKind::Numeric);

        let failure = fetcher(transport)
            .fetch(&spec, &SiteSelection::default(), Generation::new(2))
            .await
            .unwrap_err();

        assert_eq!(failure.variable, "Pith (P)");
        assert_eq!(failure.generation, Generation::new(2));
        assert!(matches!(failure.error, FetchError::Status { status: 404, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_request_times_out() {
        let transport = Arc::new(ScriptedTransport::fixtures([(
            "Bark (B)",
            json!([{"name": "ja", "count": 1}]),
        )]));
        let _gate = transport.hold(Generation::new(1));
        let spec = VariableSpec::new("Bark (B)", VariableKind::Binary);

        let failure = fetcher(transport)
            .with_timeout(Duration::from_secs(3))
            .fetch(&spec, &SiteSelection::default(), Generation::new(1))
            .await
            .unwrap_err();

        assert_eq!(
            failure.error,
            FetchError::Timeout {
                endpoint: DEFAULT_VARIABLE_ENDPOINT.to_string(),
                timeout: Duration::from_secs(3),
            }
        );
    }
}
