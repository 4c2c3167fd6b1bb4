// Core structs: requests, pages, normalized records, run results and errors
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// A record exactly as the remote source returned it.
pub type RawRecord = serde_json::Value;

/// One page request. Built by the paginator, never mutated after it is issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub endpoint: String,
    pub term: String,
    pub context: Option<String>,
    pub offset: u64,
    pub limit: u32,
}

impl FetchRequest {
    pub fn new(endpoint: &str, term: &str, context: Option<&str>, limit: u32) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            term: term.to_string(),
            context: context.map(str::to_string),
            offset: 0,
            limit,
        }
    }

    pub fn at_offset(&self, offset: u64) -> Self {
        Self {
            offset,
            ..self.clone()
        }
    }
}

/// Pagination metadata reported by the source. `total` is `None` when the
/// source cannot tell how many records exist (HTML listings).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageMeta {
    pub total: Option<u64>,
    pub start: u64,
    pub limit: u64,
}

#[derive(Debug, Clone)]
pub struct RawPage {
    pub records: Vec<RawRecord>,
    pub meta: PageMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub id: String,
    pub name: String,
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promo_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotion: Option<String>,
    pub source: String,
    pub fetched_at: DateTime<Utc>,
}

/// A logical unit of work: one search term, optionally scoped to a location or category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    pub key: String,
    pub term: String,
    pub context: Option<String>,
}

impl WorkUnit {
    pub fn for_term(term: &str) -> Self {
        Self {
            key: term.to_string(),
            term: term.to_string(),
            context: None,
        }
    }

    pub fn scoped(context: &str, term: &str) -> Self {
        Self {
            key: format!("{}/{}", context, term),
            term: term.to_string(),
            context: Some(context.to_string()),
        }
    }
}

/// Work-unit key -> normalized records, in fetch order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FetchResult(pub BTreeMap<String, Vec<NormalizedRecord>>);

impl FetchResult {
    pub fn insert(&mut self, key: String, records: Vec<NormalizedRecord>) {
        self.0.insert(key, records);
    }

    pub fn get(&self, key: &str) -> Option<&Vec<NormalizedRecord>> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn record_count(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitStats {
    pub key: String,
    pub fetched: usize,
    pub kept: usize,
    pub dropped: usize,
}

#[derive(Debug)]
pub struct UnitFailure {
    pub key: String,
    pub error: UnitError,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub succeeded: Vec<UnitStats>,
    pub failed: Vec<UnitFailure>,
}

impl RunSummary {
    pub fn total_units(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn dropped_records(&self) -> usize {
        self.succeeded.iter().map(|s| s.dropped).sum()
    }

    /// 0 when every unit succeeded, 2 on partial failure, 1 when nothing succeeded.
    pub fn exit_code(&self) -> u8 {
        match (self.succeeded.is_empty(), self.failed.is_empty()) {
            (_, true) => 0,
            (false, false) => 2,
            (true, false) => 1,
        }
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub result: FetchResult,
    pub summary: RunSummary,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("credentials rejected (HTTP {status})")]
    Auth { status: u16 },
    #[error("remote returned HTTP {status}: {body}")]
    Remote { status: u16, body: String },
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("gave up after {attempts} attempts: {last}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// Connection problems, throttling and server-side errors are worth another try.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Transport(_) => true,
            FetchError::Remote { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, FetchError::Auth { .. })
    }
}

/// Why a raw record was not turned into a `NormalizedRecord`. Never leaves the normalizer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("record is not an object")]
    NotAnObject,
    #[error("entry of type `{0}` is not a product")]
    NotAProduct(String),
    #[error("missing or empty field `{0}`")]
    MissingField(&'static str),
}

#[derive(Debug, Error)]
pub enum ParserError {
    #[error("invalid selector `{selector}`: {reason}")]
    InvalidSelector { selector: String, reason: String },
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum UnitError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("skipped: credentials were rejected earlier in the run")]
    CredentialsRejected,
    #[error("run deadline exceeded")]
    DeadlineExceeded,
}
