use crate::config::OpenFoodFactsConfig;
use crate::model::{FetchError, FetchRequest, PageMeta, RawPage};
use crate::normalizer::RecordShape;
use crate::scraper::fetcher::HttpFetcher;
use crate::scraper::traits::Source;

use serde_json::Value;

/// OpenFoodFacts search API. Pages are 1-based and `count` may be a number or a string.
pub struct OpenFoodFactsSource {
    http: HttpFetcher,
    search_url: String,
}

impl OpenFoodFactsSource {
    pub fn new(http: HttpFetcher, cfg: &OpenFoodFactsConfig) -> Self {
        Self {
            http,
            search_url: format!("{}/cgi/search.pl", cfg.base_url.trim_end_matches('/')),
        }
    }
}

fn as_u64(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn page_from_body(body: Value, page: u64, page_size: u64) -> Result<RawPage, FetchError> {
    let Value::Object(mut map) = body else {
        return Err(FetchError::Decode("search response is not an object".into()));
    };
    let records = match map.remove("products") {
        Some(Value::Array(products)) => products,
        None | Some(Value::Null) => Vec::new(),
        Some(_) => return Err(FetchError::Decode("`products` is not an array".into())),
    };
    let page = as_u64(map.get("page")).unwrap_or(page).max(1);
    // The server may clamp `page_size`; report the size it actually used.
    let page_size = as_u64(map.get("page_size"))
        .filter(|size| *size > 0)
        .unwrap_or(page_size);
    let start = (page - 1).checked_mul(page_size).ok_or_else(|| {
        FetchError::Decode(format!("page {} of size {} is out of range", page, page_size))
    })?;

    Ok(RawPage {
        records,
        meta: PageMeta {
            total: as_u64(map.get("count")),
            start,
            limit: page_size,
        },
    })
}

#[async_trait::async_trait]
impl Source for OpenFoodFactsSource {
    fn endpoint(&self) -> &str {
        &self.search_url
    }

    fn shape(&self) -> RecordShape {
        RecordShape::OpenFoodFacts
    }

    async fn fetch_page(&self, req: &FetchRequest) -> Result<RawPage, FetchError> {
        let page_size = u64::from(req.limit.max(1));
        let page = req.offset / page_size + 1;
        let mut query = vec![
            ("json", "1".to_string()),
            ("action", "process".to_string()),
            ("search_terms", req.term.clone()),
            ("page", page.to_string()),
            ("page_size", page_size.to_string()),
        ];
        if let Some(category) = &req.context {
            query.push(("tagtype_0", "categories".to_string()));
            query.push(("tag_contains_0", "contains".to_string()));
            query.push(("tag_0", category.clone()));
        }

        let body = self.http.get_json(&req.endpoint, &query, None).await?;
        page_from_body(body, page, page_size)
    }
}
