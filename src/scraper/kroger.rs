// Kroger product API: OAuth2 client-credentials token, store lookup, paged product search
use crate::config::{Credentials, KrogerConfig};
use crate::model::{FetchError, FetchRequest, PageMeta, RawPage};
use crate::normalizer::RecordShape;
use crate::scraper::fetcher::HttpFetcher;
use crate::scraper::traits::Source;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct LocationsResponse {
    #[serde(default)]
    data: Vec<Location>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Location {
    location_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProductsResponse {
    #[serde(default)]
    data: Vec<Value>,
    #[serde(default)]
    meta: Meta,
}

#[derive(Debug, Default, Deserialize)]
struct Meta {
    #[serde(default)]
    pagination: Pagination,
}

#[derive(Debug, Default, Deserialize)]
struct Pagination {
    #[serde(default)]
    total: u64,
    #[serde(default)]
    start: u64,
    #[serde(default)]
    limit: u64,
}

pub struct KrogerSource {
    http: HttpFetcher,
    base_url: String,
    products_url: String,
    scope: String,
    credentials: Credentials,
    token: RwLock<Option<String>>,
}

impl KrogerSource {
    pub fn new(http: HttpFetcher, cfg: &KrogerConfig, credentials: Credentials) -> Self {
        let base_url = cfg.base_url.trim_end_matches('/').to_string();
        Self {
            http,
            products_url: format!("{}/v1/products", base_url),
            base_url,
            scope: cfg.scope.clone(),
            credentials,
            token: RwLock::new(None),
        }
    }

    /// Requests a fresh access token and stores it for subsequent calls.
    pub async fn authenticate(&self) -> Result<(), FetchError> {
        let url = format!("{}/v1/connect/oauth2/token", self.base_url);
        let body = self
            .http
            .post_form_basic(
                &url,
                &[("grant_type", "client_credentials"), ("scope", self.scope.as_str())],
                &self.credentials.client_id,
                &self.credentials.client_secret,
            )
            .await?;
        let token: TokenResponse =
            serde_json::from_value(body).map_err(|e| FetchError::Decode(e.to_string()))?;

        *self.token.write().await = Some(token.access_token);
        info!("Acquired Kroger access token");
        Ok(())
    }

    async fn bearer(&self) -> Result<String, FetchError> {
        // No token yet is treated like a rejected one so the refresh path kicks in.
        self.token
            .read()
            .await
            .clone()
            .ok_or(FetchError::Auth { status: 401 })
    }

    /// Store ids within `radius_miles` of `zip_code`.
    pub async fn find_locations(
        &self,
        zip_code: &str,
        radius_miles: u32,
        limit: u32,
    ) -> Result<Vec<String>, FetchError> {
        let url = format!("{}/v1/locations", self.base_url);
        let token = self.bearer().await?;
        let query = [
            ("filter.zipCode.near", zip_code.to_string()),
            ("filter.radiusInMiles", radius_miles.to_string()),
            ("filter.limit", limit.to_string()),
        ];
        let body = self.http.get_json(&url, &query, Some(&token)).await?;
        let parsed: LocationsResponse =
            serde_json::from_value(body).map_err(|e| FetchError::Decode(e.to_string()))?;

        Ok(parsed
            .data
            .into_iter()
            .filter_map(|l| l.location_id)
            .filter(|id| !id.trim().is_empty())
            .collect())
    }
}

#[async_trait::async_trait]
impl Source for KrogerSource {
    fn endpoint(&self) -> &str {
        &self.products_url
    }

    fn shape(&self) -> RecordShape {
        RecordShape::Kroger
    }

    async fn fetch_page(&self, req: &FetchRequest) -> Result<RawPage, FetchError> {
        let token = self.bearer().await?;
        let mut query = vec![
            ("filter.term", req.term.clone()),
            ("filter.start", req.offset.to_string()),
            ("filter.limit", req.limit.to_string()),
        ];
        if let Some(location) = &req.context {
            query.push(("filter.locationId", location.clone()));
        }

        let body = self.http.get_json(&req.endpoint, &query, Some(&token)).await?;
        let parsed: ProductsResponse =
            serde_json::from_value(body).map_err(|e| FetchError::Decode(e.to_string()))?;
        let p = parsed.meta.pagination;

        Ok(RawPage {
            records: parsed.data,
            meta: PageMeta {
                total: Some(p.total),
                start: p.start,
                limit: p.limit,
            },
        })
    }

    async fn refresh_credentials(&self) -> Result<bool, FetchError> {
        info!("Refreshing Kroger access token");
        self.authenticate().await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpConfig;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(server: &MockServer) -> KrogerSource {
        let http = HttpFetcher::new(&HttpConfig::default()).unwrap();
        let cfg: KrogerConfig = serde_json::from_value(json!({
            "base_url": server.uri(),
            "zip_code": "66044"
        }))
        .unwrap();
        KrogerSource::new(
            http,
            &cfg,
            Credentials {
                client_id: "id".into(),
                client_secret: "secret".into(),
            },
        )
    }

    async fn mount_token(server: &MockServer, token: &str) {
        Mock::given(method("POST"))
            .and(path("/v1/connect/oauth2/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("scope=product.compact"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "access_token": token, "expires_in": 1800 })),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn fetches_products_page_with_token() {
        let server = MockServer::start().await;
        mount_token(&server, "abc").await;
        Mock::given(method("GET"))
            .and(path("/v1/products"))
            .and(header("Authorization", "Bearer abc"))
            .and(query_param("filter.term", "banana"))
            .and(query_param("filter.locationId", "70300123"))
            .and(query_param("filter.start", "50"))
            .and(query_param("filter.limit", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "productId": "1", "description": "Banana" }],
                "meta": { "pagination": { "total": 51, "start": 50, "limit": 50 } }
            })))
            .mount(&server)
            .await;

        let src = source(&server);
        src.authenticate().await.unwrap();

        let req = FetchRequest::new(src.endpoint(), "banana", Some("70300123"), 50).at_offset(50);
        let page = src.fetch_page(&req).await.unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(
            page.meta,
            PageMeta {
                total: Some(51),
                start: 50,
                limit: 50
            }
        );
    }

    #[tokio::test]
    async fn missing_token_reports_auth_error() {
        let server = MockServer::start().await;
        let src = source(&server);
        let req = FetchRequest::new(src.endpoint(), "milk", None, 50);
        assert!(matches!(src.fetch_page(&req).await, Err(FetchError::Auth { .. })));
    }

    #[tokio::test]
    async fn finds_locations_near_zip() {
        let server = MockServer::start().await;
        mount_token(&server, "abc").await;
        Mock::given(method("GET"))
            .and(path("/v1/locations"))
            .and(query_param("filter.zipCode.near", "66044"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    { "locationId": "70300123" },
                    { "name": "no id" },
                    { "locationId": "70300456" }
                ]
            })))
            .mount(&server)
            .await;

        let src = source(&server);
        src.authenticate().await.unwrap();
        let ids = src.find_locations("66044", 10, 5).await.unwrap();
        assert_eq!(ids, vec!["70300123", "70300456"]);
    }

    #[tokio::test]
    async fn refresh_replaces_token() {
        let server = MockServer::start().await;
        mount_token(&server, "fresh").await;
        let src = source(&server);
        assert!(src.refresh_credentials().await.unwrap());
        assert_eq!(src.bearer().await.unwrap(), "fresh");
    }
}
