// Walmart storefront search over its GraphQL gateway (persisted `Search` query)
use crate::config::WalmartConfig;
use crate::model::{FetchError, FetchRequest, PageMeta, RawPage};
use crate::normalizer::RecordShape;
use crate::scraper::fetcher::HttpFetcher;
use crate::scraper::traits::Source;

use serde_json::{Value, json};

const GRAPHQL_HEADERS: [(&str, &str); 6] = [
    ("x-apollo-operation-name", "Search"),
    ("x-o-gql-query", "query Search"),
    ("x-o-bu", "WALMART-US"),
    ("x-o-mart", "B2C"),
    ("x-o-platform", "rweb"),
    ("tenant-id", "elh9ie"),
];

pub struct WalmartSource {
    http: HttpFetcher,
    search_url: String,
    sort: String,
}

impl WalmartSource {
    pub fn new(http: HttpFetcher, cfg: &WalmartConfig) -> Self {
        Self {
            http,
            search_url: format!("{}{}", cfg.base_url.trim_end_matches('/'), cfg.search_path),
            sort: cfg.sort.clone(),
        }
    }

    fn variables(&self, req: &FetchRequest, page: u64) -> Value {
        json!({
            "id": "",
            "query": req.term,
            "page": page,
            "prg": "desktop",
            "catId": req.context.as_deref().unwrap_or(""),
            "sort": self.sort,
            "ps": req.limit,
            "limit": req.limit,
            "pageType": "SearchPage",
            "tenant": "WM_GLASS",
            "searchArgs": {
                "query": req.term,
                "cat_id": req.context.as_deref().unwrap_or(""),
                "prg": "desktop",
            },
        })
    }
}

fn graphql_error(body: &Value) -> Option<String> {
    let errors = body.get("errors")?.as_array()?;
    let first = errors.first()?;
    Some(
        first
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown GraphQL error")
            .to_string(),
    )
}

/// Products come from the first item stack. `aggregatedCount` is the match
/// count, but the storefront stops serving after `paginationV2.maxPage`.
fn page_from_body(body: Value, page: u64, page_size: u64) -> Result<RawPage, FetchError> {
    let Some(result) = body.pointer("/data/search/searchResult") else {
        return Err(FetchError::Decode(match graphql_error(&body) {
            Some(message) => format!("search failed: {}", message),
            None => "response has no `data.search.searchResult`".into(),
        }));
    };

    let records = match result.pointer("/itemStacks/0/itemsV2") {
        Some(Value::Array(items)) => items.clone(),
        None | Some(Value::Null) => Vec::new(),
        Some(_) => return Err(FetchError::Decode("`itemsV2` is not an array".into())),
    };

    let start = (page - 1).checked_mul(page_size).ok_or_else(|| {
        FetchError::Decode(format!("page {} of size {} is out of range", page, page_size))
    })?;
    let served = result
        .pointer("/paginationV2/maxPage")
        .and_then(Value::as_u64)
        .and_then(|max_page| max_page.checked_mul(page_size));
    let total = match (result.get("aggregatedCount").and_then(Value::as_u64), served) {
        (Some(count), Some(served)) => Some(count.min(served)),
        (count, served) => count.or(served),
    };

    Ok(RawPage {
        records,
        meta: PageMeta {
            total,
            start,
            limit: page_size,
        },
    })
}

#[async_trait::async_trait]
impl Source for WalmartSource {
    fn endpoint(&self) -> &str {
        &self.search_url
    }

    fn shape(&self) -> RecordShape {
        RecordShape::Walmart
    }

    async fn fetch_page(&self, req: &FetchRequest) -> Result<RawPage, FetchError> {
        let page_size = u64::from(req.limit.max(1));
        let page = req.offset / page_size + 1;
        let query = [("variables", self.variables(req, page).to_string())];

        let body = self
            .http
            .get_json_with_headers(&req.endpoint, &query, &GRAPHQL_HEADERS)
            .await?;
        page_from_body(body, page, page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpConfig;
    use wiremock::matchers::{header, method, path_regex};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn search_body(items: Value, count: u64, max_page: u64) -> Value {
        json!({
            "data": {
                "search": {
                    "searchResult": {
                        "aggregatedCount": count,
                        "paginationV2": { "maxPage": max_page },
                        "itemStacks": [{ "itemsV2": items }]
                    }
                }
            }
        })
    }

    #[test]
    fn reads_first_item_stack() {
        let items = json!([
            { "__typename": "Product", "usItemId": "1", "name": "Bananas" },
            { "__typename": "AdPlaceholder" }
        ]);
        let page = page_from_body(search_body(items, 300, 25), 2, 40).unwrap();
        assert_eq!(page.records.len(), 2);
        assert_eq!(
            page.meta,
            PageMeta {
                total: Some(300),
                start: 40,
                limit: 40
            }
        );
    }

    #[test]
    fn total_is_capped_by_served_pages() {
        let page = page_from_body(search_body(json!([]), 5000, 25), 1, 40).unwrap();
        assert_eq!(page.meta.total, Some(1000));
    }

    #[test]
    fn graphql_errors_are_decode_errors() {
        let body = json!({ "errors": [{ "message": "PersistedQueryNotFound" }] });
        match page_from_body(body, 1, 40) {
            Err(FetchError::Decode(msg)) => assert!(msg.contains("PersistedQueryNotFound")),
            other => panic!("expected Decode, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn sends_search_variables_and_operation_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex("^/orchestra/snb/graphql/Search/.+/search$"))
            .and(header("x-apollo-operation-name", "Search"))
            .respond_with(|req: &Request| {
                let variables = req
                    .url
                    .query_pairs()
                    .find(|(k, _)| k == "variables")
                    .map(|(_, v)| v.into_owned())
                    .unwrap_or_default();
                let variables: Value = serde_json::from_str(&variables).unwrap_or(Value::Null);
                let ok = variables["query"] == "whole milk"
                    && variables["page"] == 3
                    && variables["ps"] == 40
                    && variables["catId"] == "976759";
                if ok {
                    let items = json!([
                        { "__typename": "Product", "usItemId": "10450114", "name": "Milk" }
                    ]);
                    ResponseTemplate::new(200).set_body_json(search_body(items, 81, 3))
                } else {
                    ResponseTemplate::new(400)
                }
            })
            .mount(&server)
            .await;

        let cfg: WalmartConfig =
            serde_json::from_value(json!({ "base_url": server.uri() })).unwrap();
        let http = HttpFetcher::new(&HttpConfig::default()).unwrap();
        let source = WalmartSource::new(http, &cfg);

        let req = FetchRequest::new(source.endpoint(), "whole milk", Some("976759"), 40)
            .at_offset(80);
        let page = source.fetch_page(&req).await.unwrap();

        assert_eq!(page.records[0]["usItemId"], "10450114");
        assert_eq!(page.meta.start, 80);
        assert_eq!(page.meta.total, Some(81));
    }
}
