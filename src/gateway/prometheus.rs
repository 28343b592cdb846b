//! Prometheus scrape client
//!
//! Fetches the text exposition format from `/metrics`, parses every sample
//! and picks the one series each [`MetricSpec`] asks for.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::{GatewayError, MetricsGateway};

/// Declared Prometheus metric type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PromType {
    Counter,
    Gauge,
    Histogram,
    Summary,
    Untyped,
}

/// One requested series
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSpec {
    /// Family name as exposed (without `_sum` for summaries/histograms)
    pub name: &'static str,

    /// Declared type, decides which sample carries the value
    pub metric_type: PromType,

    /// Labels the selected series must carry
    pub labels: Vec<(&'static str, &'static str)>,
}

impl MetricSpec {
    pub const fn new(name: &'static str, metric_type: PromType) -> Self {
        Self {
            name,
            metric_type,
            labels: Vec::new(),
        }
    }

    pub fn with_label(mut self, key: &'static str, value: &'static str) -> Self {
        self.labels.push((key, value));
        self
    }

    /// Name of the sample that holds the value for this spec
    fn sample_name(&self) -> String {
        match self.metric_type {
            PromType::Counter | PromType::Gauge | PromType::Untyped => self.name.to_string(),
            PromType::Histogram | PromType::Summary => format!("{}_sum", self.name),
        }
    }

    fn matches(&self, sample: &Sample) -> bool {
        sample.name == self.sample_name()
            && self
                .labels
                .iter()
                .all(|(k, v)| sample.labels.get(*k).map(String::as_str) == Some(*v))
    }
}

/// Value extracted for a spec
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScrapedMetric {
    pub value: f64,
    pub labels: HashMap<String, String>,
}

/// A parsed exposition sample
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub labels: HashMap<String, String>,
    pub value: f64,
}

/// Parse the Prometheus text exposition format
///
/// Comment lines are skipped; malformed sample lines are ignored rather than
/// failing the whole scrape.
pub fn parse_exposition(body: &str) -> Vec<Sample> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(parse_sample)
        .collect()
}

fn parse_sample(line: &str) -> Option<Sample> {
    let (name, labels, rest) = match line.find('{') {
        Some(open) => {
            let (labels, rest) = parse_labels(&line[open + 1..])?;
            (&line[..open], labels, rest)
        }
        None => {
            let split = line.find(char::is_whitespace)?;
            (&line[..split], HashMap::new(), &line[split..])
        }
    };

    let value = rest.split_whitespace().next()?.parse::<f64>().ok()?;

    Some(Sample {
        name: name.trim().to_string(),
        labels,
        value,
    })
}

/// Parse `key="value",...}` and return the labels plus the text after the
/// closing brace; braces inside quoted values do not close the set
fn parse_labels(raw: &str) -> Option<(HashMap<String, String>, &str)> {
    let mut labels = HashMap::new();
    let mut chars = raw.char_indices().peekable();

    loop {
        while matches!(chars.peek(), Some((_, c)) if c.is_whitespace() || *c == ',') {
            chars.next();
        }
        match chars.peek() {
            None => return None,
            Some(&(close, '}')) => return Some((labels, &raw[close + 1..])),
            Some(_) => {}
        }

        let key: String = chars.by_ref().map(|(_, c)| c).take_while(|c| *c != '=').collect();
        if chars.next()?.1 != '"' {
            return None;
        }

        let mut value = String::new();
        loop {
            match chars.next()?.1 {
                '\\' => match chars.next()?.1 {
                    'n' => value.push('\n'),
                    other => value.push(other),
                },
                '"' => break,
                c => value.push(c),
            }
        }

        labels.insert(key.trim().to_string(), value);
    }
}

/// Pick the first sample matching each spec
pub fn select(samples: &[Sample], specs: &[MetricSpec]) -> HashMap<String, ScrapedMetric> {
    specs
        .iter()
        .filter_map(|spec| {
            samples.iter().find(|s| spec.matches(s)).map(|s| {
                (
                    spec.name.to_string(),
                    ScrapedMetric {
                        value: s.value,
                        labels: s.labels.clone(),
                    },
                )
            })
        })
        .collect()
}

/// HTTP scrape client shared by every host task
pub struct PrometheusClient {
    client: Client,
    timeout: Duration,
}

impl PrometheusClient {
    pub fn new(timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport {
                endpoint: String::new(),
                message: e.to_string(),
            })?;

        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl MetricsGateway for PrometheusClient {
    async fn scrape(
        &self,
        endpoint: &str,
        specs: &[MetricSpec],
    ) -> Result<HashMap<String, ScrapedMetric>, GatewayError> {
        let response = self.client.get(endpoint).send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout {
                    operation: format!("scrape {}", endpoint),
                    timeout: self.timeout,
                }
            } else {
                GatewayError::Transport {
                    endpoint: endpoint.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        if !response.status().is_success() {
            return Err(GatewayError::Status {
                endpoint: endpoint.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| GatewayError::Decode {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })?;

        let samples = parse_exposition(&body);
        debug!("📈 {} samples scraped from {}", samples.len(), endpoint);

        Ok(select(&samples, specs))
    }
}
