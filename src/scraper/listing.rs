use crate::config::ListingConfig;
use crate::model::{FetchError, FetchRequest, PageMeta, RawPage};
use crate::normalizer::RecordShape;
use crate::parser::{ListingExtractor, PageExtractor};
use crate::scraper::fetcher::HttpFetcher;
use crate::scraper::traits::Source;

use url::Url;

/// Storefront listing pages fetched as HTML. These pages never say how many
/// results exist, so every page reports an unknown total and the paginator
/// stops at the first empty page.
pub struct ListingSource {
    http: HttpFetcher,
    url_template: String,
    extractor: Box<dyn PageExtractor>,
}

impl ListingSource {
    pub fn new(http: HttpFetcher, cfg: &ListingConfig) -> Result<Self, FetchError> {
        let extractor = ListingExtractor::new(&cfg.selectors)
            .map_err(|e| FetchError::Decode(e.to_string()))?;
        Ok(Self::with_extractor(http, &cfg.url_template, Box::new(extractor)))
    }

    pub fn with_extractor(
        http: HttpFetcher,
        url_template: &str,
        extractor: Box<dyn PageExtractor>,
    ) -> Self {
        Self {
            http,
            url_template: url_template.to_string(),
            extractor,
        }
    }

    fn page_url(&self, req: &FetchRequest) -> String {
        let term: String = url::form_urlencoded::byte_serialize(req.term.as_bytes()).collect();
        req.endpoint
            .replace("{term}", &term)
            .replace("{offset}", &req.offset.to_string())
            .replace("{limit}", &req.limit.to_string())
    }
}

#[async_trait::async_trait]
impl Source for ListingSource {
    fn endpoint(&self) -> &str {
        &self.url_template
    }

    fn shape(&self) -> RecordShape {
        RecordShape::Listing
    }

    async fn fetch_page(&self, req: &FetchRequest) -> Result<RawPage, FetchError> {
        let url = self.page_url(req);
        let html = self.http.get_text(&url).await?;
        let base = Url::parse(&url).ok();
        let records = self.extractor.extract_page(&html, base.as_ref());

        Ok(RawPage {
            meta: PageMeta {
                total: None,
                start: req.offset,
                limit: records.len() as u64,
            },
            records,
        })
    }
}
