// Product-grid HTML extraction for storefront listing pages
use crate::config::ListingSelectors;
use crate::model::{ParserError, RawRecord};
use crate::utils::{first_number, parse_count};

use scraper::{ElementRef, Html, Selector};
use serde_json::json;
use tracing::warn;
use url::Url;

/// Turns one rendered listing page into raw records.
pub trait PageExtractor: Send + Sync {
    fn extract_page(&self, html: &str, page_url: Option<&Url>) -> Vec<RawRecord>;
}

pub struct ListingExtractor {
    card: Selector,
    title: Selector,
    link: Selector,
    price: Selector,
    image: Selector,
    rating: Selector,
    review_count: Selector,
    promotion: Selector,
}

fn parse_selector(selector: &str) -> Result<Selector, ParserError> {
    Selector::parse(selector).map_err(|e| ParserError::InvalidSelector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

fn text_of(element: ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn resolve(page_url: Option<&Url>, href: &str) -> String {
    match page_url.and_then(|base| base.join(href).ok()) {
        Some(resolved) => resolved.to_string(),
        None => href.to_string(),
    }
}

/// Product id from a listing link: the code after `/p/` when it looks like
/// one (`/p/A-12345678`), otherwise the last path segment.
pub fn id_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);

    for (idx, _) in path.match_indices("/p/") {
        let code: String = path[idx + 3..]
            .chars()
            .take_while(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || *c == '-')
            .collect();
        if !code.is_empty() {
            return Some(code);
        }
    }

    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl ListingExtractor {
    pub fn new(selectors: &ListingSelectors) -> Result<Self, ParserError> {
        Ok(Self {
            card: parse_selector(&selectors.card)?,
            title: parse_selector(&selectors.title)?,
            link: parse_selector(&selectors.link)?,
            price: parse_selector(&selectors.price)?,
            image: parse_selector(&selectors.image)?,
            rating: parse_selector(&selectors.rating)?,
            review_count: parse_selector(&selectors.review_count)?,
            promotion: parse_selector(&selectors.promotion)?,
        })
    }
}

impl PageExtractor for ListingExtractor {
    fn extract_page(&self, html: &str, page_url: Option<&Url>) -> Vec<RawRecord> {
        let document = Html::parse_document(html);
        let mut records = Vec::new();

        for (i, card) in document.select(&self.card).enumerate() {
            let name = card.select(&self.title).next().map(text_of).unwrap_or_default();
            let href = card
                .select(&self.link)
                .next()
                .and_then(|a| a.value().attr("href"))
                .unwrap_or("")
                .trim();

            if name.is_empty() || href.is_empty() {
                warn!("Skipping card {} with incomplete data: name={:?}, href={:?}", i, name, href);
                continue;
            }

            let url = resolve(page_url, href);
            let Some(id) = id_from_url(&url) else {
                warn!("Skipping card {}: no product id in {}", i, url);
                continue;
            };
            let price = card.select(&self.price).next().map(text_of);
            let image_url = card
                .select(&self.image)
                .next()
                .and_then(|img| img.value().attr("src"))
                .map(str::trim)
                .filter(|src| !src.is_empty())
                .map(|src| resolve(page_url, src));
            let rating = card.select(&self.rating).next().and_then(|el| {
                el.value()
                    .attr("aria-label")
                    .and_then(first_number)
                    .or_else(|| first_number(&text_of(el)))
            });
            let review_count = card
                .select(&self.review_count)
                .next()
                .and_then(|el| parse_count(&text_of(el)));
            let promotion = card
                .select(&self.promotion)
                .next()
                .map(text_of)
                .filter(|p| !p.is_empty());

            records.push(json!({
                "id": id,
                "name": name,
                "url": url,
                "price": price,
                "image_url": image_url,
                "rating": rating,
                "review_count": review_count,
                "promotion": promotion,
            }));
        }

        records
    }
}
