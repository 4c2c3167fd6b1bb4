// Scripted in-memory source for paginator and pipeline tests
use crate::model::{FetchError, FetchRequest, PageMeta, RawPage, RawRecord};
use crate::normalizer::RecordShape;
use crate::scraper::traits::Source;

use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

pub type Reply = Result<RawPage, FetchError>;

#[derive(Default)]
pub struct MockSource {
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<FetchRequest>>,
    refreshes: AtomicU32,
    refresh_outcome: Option<bool>,
}

pub fn page(records: Vec<RawRecord>, total: Option<u64>, start: u64, limit: u64) -> RawPage {
    RawPage {
        records,
        meta: PageMeta { total, start, limit },
    }
}

/// `count` well-formed Kroger-shaped products with ids starting at `first`.
pub fn products(first: usize, count: usize) -> Vec<RawRecord> {
    (first..first + count)
        .map(|i| json!({ "productId": i.to_string(), "description": format!("Product {}", i) }))
        .collect()
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Some(true)` makes `refresh_credentials` succeed, `Some(false)` report
    /// nothing to refresh, `None` fail with a transport error.
    pub fn with_refresh(mut self, outcome: Option<bool>) -> Self {
        self.refresh_outcome = outcome;
        self
    }

    pub fn script(self, term: &str, replies: Vec<Reply>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(term.to_string())
            .or_default()
            .extend(replies);
        self
    }

    pub fn requests_for(&self, term: &str) -> Vec<FetchRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.term == term)
            .cloned()
            .collect()
    }

    pub fn refreshes(&self) -> u32 {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Source for MockSource {
    fn endpoint(&self) -> &str {
        "mock://products"
    }

    fn shape(&self) -> RecordShape {
        RecordShape::Kroger
    }

    async fn fetch_page(&self, req: &FetchRequest) -> Result<RawPage, FetchError> {
        self.requests.lock().unwrap().push(req.clone());
        self.scripts
            .lock()
            .unwrap()
            .get_mut(&req.term)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(page(Vec::new(), Some(0), req.offset, u64::from(req.limit))))
    }

    async fn refresh_credentials(&self) -> Result<bool, FetchError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        self.refresh_outcome
            .ok_or_else(|| FetchError::Transport("token endpoint unreachable".into()))
    }
}
