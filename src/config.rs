use serde::Deserialize;
use std::fs;
use thiserror::Error;

pub const CLIENT_ID_ENV: &str = "KROGER_CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "KROGER_CLIENT_SECRET";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("missing credential: set {0}")]
    MissingCredential(&'static str),
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub terms: Vec<String>,
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub run_deadline_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    Kroger(KrogerConfig),
    #[serde(rename = "openfoodfacts")]
    OpenFoodFacts(OpenFoodFactsConfig),
    Walmart(WalmartConfig),
    Listing(ListingConfig),
}

#[derive(Debug, Deserialize)]
pub struct KrogerConfig {
    #[serde(default = "default_kroger_base_url")]
    pub base_url: String,
    #[serde(default = "default_kroger_scope")]
    pub scope: String,
    /// Public client identifier; the secret only ever comes from the environment.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Fixed store ids. When empty, stores are looked up near `zip_code`.
    #[serde(default)]
    pub location_ids: Vec<String>,
    #[serde(default)]
    pub zip_code: Option<String>,
    #[serde(default = "default_radius_miles")]
    pub radius_miles: u32,
    #[serde(default = "default_location_limit")]
    pub location_limit: u32,
}

#[derive(Debug, Deserialize)]
pub struct OpenFoodFactsConfig {
    #[serde(default = "default_off_base_url")]
    pub base_url: String,
    /// Optional category tags; each term is searched once per category.
    #[serde(default)]
    pub categories: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct WalmartConfig {
    #[serde(default = "default_walmart_base_url")]
    pub base_url: String,
    /// Persisted-query path of the storefront's GraphQL `Search` operation.
    #[serde(default = "default_walmart_search_path")]
    pub search_path: String,
    #[serde(default = "default_walmart_sort")]
    pub sort: String,
    /// Optional category ids; each term is searched once per category.
    #[serde(default)]
    pub categories: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListingConfig {
    /// Page URL with `{term}` and `{offset}` placeholders.
    pub url_template: String,
    #[serde(default)]
    pub selectors: ListingSelectors,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListingSelectors {
    pub card: String,
    pub title: String,
    pub link: String,
    pub price: String,
    pub image: String,
    /// Element whose `aria-label` (or text) carries the star rating.
    pub rating: String,
    pub review_count: String,
    pub promotion: String,
}

impl Default for ListingSelectors {
    fn default() -> Self {
        Self {
            card: "[data-test='product-card']".into(),
            title: "[data-test='product-title']".into(),
            link: "a[href*='/p/']".into(),
            price: "[data-test='product-price']".into(),
            image: "img".into(),
            rating: "[data-test='ratings']".into(),
            review_count: "[data-test='review-count']".into(),
            promotion: "[data-test='product-promotions'], [data-test='product-item-deal-flag']"
                .into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    pub page_size: u32,
    pub max_pages: u32,
    pub page_delay_ms: u64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            max_pages: 40,
            page_delay_ms: 300,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff: BackoffKind,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2000,
            max_delay_ms: 30_000,
            backoff: BackoffKind::Fixed,
            jitter: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: concat!("grocery-sniper/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

// Keep the secret out of debug logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .finish()
    }
}

impl Credentials {
    /// Environment wins over the config file for the client id.
    pub fn resolve(config_client_id: Option<&str>) -> Result<Self, ConfigError> {
        Self::resolve_with(config_client_id, |key| std::env::var(key).ok())
    }

    fn resolve_with(
        config_client_id: Option<&str>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let non_blank = |v: String| (!v.trim().is_empty()).then_some(v);
        let client_id = lookup(CLIENT_ID_ENV)
            .and_then(non_blank)
            .or_else(|| config_client_id.map(str::to_string).and_then(non_blank))
            .ok_or(ConfigError::MissingCredential(CLIENT_ID_ENV))?;
        let client_secret = lookup(CLIENT_SECRET_ENV)
            .and_then(non_blank)
            .ok_or(ConfigError::MissingCredential(CLIENT_SECRET_ENV))?;
        Ok(Self {
            client_id,
            client_secret,
        })
    }
}

impl AppConfig {
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.terms.iter().all(|t| t.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "`terms` must contain at least one search term".into(),
            ));
        }
        if self.pagination.page_size == 0 {
            return Err(ConfigError::Invalid("`pagination.page_size` must be positive".into()));
        }
        if self.pagination.max_pages == 0 {
            return Err(ConfigError::Invalid("`pagination.max_pages` must be positive".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("`retry.max_attempts` must be at least 1".into()));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("`concurrency` must be at least 1".into()));
        }
        match &self.source {
            SourceConfig::Kroger(k) if k.location_ids.is_empty() && k.zip_code.is_none() => Err(
                ConfigError::Invalid("kroger source needs `location_ids` or `zip_code`".into()),
            ),
            SourceConfig::Listing(l) => {
                for placeholder in ["{term}", "{offset}"] {
                    if !l.url_template.contains(placeholder) {
                        return Err(ConfigError::Invalid(format!(
                            "listing `url_template` must contain `{}`",
                            placeholder
                        )));
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Terms with surrounding whitespace removed and blanks skipped.
    pub fn search_terms(&self) -> Vec<&str> {
        self.terms
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_string(),
        source,
    })?;
    AppConfig::from_json(&content)
}

fn default_concurrency() -> usize {
    1
}

fn default_kroger_base_url() -> String {
    "https://api-ce.kroger.com".into()
}

fn default_kroger_scope() -> String {
    "product.compact".into()
}

fn default_radius_miles() -> u32 {
    10
}

fn default_location_limit() -> u32 {
    5
}

fn default_off_base_url() -> String {
    "https://world.openfoodfacts.org".into()
}

fn default_walmart_base_url() -> String {
    "https://www.walmart.com".into()
}

fn default_walmart_search_path() -> String {
    concat!(
        "/orchestra/snb/graphql/Search/",
        "c0be3cc4546bc06152e6967194463cb5a237939e90451752293bee56d59ffc20",
        "/search"
    )
    .into()
}

fn default_walmart_sort() -> String {
    "best_match".into()
}
