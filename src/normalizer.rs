use crate::model::{NormalizedRecord, RawRecord, ValidationError};
use crate::utils::{non_empty_text, parse_price};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

const KROGER_SITE: &str = "https://www.kroger.com";
const WALMART_SITE: &str = "https://www.walmart.com";

/// The raw record layouts we know how to map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordShape {
    Kroger,
    OpenFoodFacts,
    Walmart,
    Listing,
}

impl RecordShape {
    pub fn label(self) -> &'static str {
        match self {
            RecordShape::Kroger => "kroger",
            RecordShape::OpenFoodFacts => "openfoodfacts",
            RecordShape::Walmart => "walmart",
            RecordShape::Listing => "listing",
        }
    }
}

/// Normalizes a batch, returning the kept records and how many were dropped.
pub fn normalize_all(
    shape: RecordShape,
    raw: &[RawRecord],
    fetched_at: DateTime<Utc>,
) -> (Vec<NormalizedRecord>, usize) {
    let records: Vec<NormalizedRecord> = raw
        .iter()
        .filter_map(|r| normalize(shape, r, fetched_at))
        .collect();
    let dropped = raw.len() - records.len();
    (records, dropped)
}

pub fn normalize(
    shape: RecordShape,
    raw: &RawRecord,
    fetched_at: DateTime<Utc>,
) -> Option<NormalizedRecord> {
    match try_normalize(shape, raw, fetched_at) {
        Ok(record) => Some(record),
        Err(e) => {
            debug!("Dropping {} record: {}", shape.label(), e);
            None
        }
    }
}

pub fn try_normalize(
    shape: RecordShape,
    raw: &RawRecord,
    fetched_at: DateTime<Utc>,
) -> Result<NormalizedRecord, ValidationError> {
    if !raw.is_object() {
        return Err(ValidationError::NotAnObject);
    }
    match shape {
        RecordShape::Kroger => normalize_kroger(raw, fetched_at),
        RecordShape::OpenFoodFacts => normalize_open_food_facts(raw, fetched_at),
        RecordShape::Walmart => normalize_walmart(raw, fetched_at),
        RecordShape::Listing => normalize_listing(raw, fetched_at),
    }
}

fn required(raw: &Value, field: &'static str) -> Result<String, ValidationError> {
    non_empty_text(raw.get(field)).ok_or(ValidationError::MissingField(field))
}

fn bare(
    shape: RecordShape,
    id: String,
    name: String,
    fetched_at: DateTime<Utc>,
) -> NormalizedRecord {
    NormalizedRecord {
        id,
        name,
        price: None,
        promo_price: None,
        brand: None,
        size: None,
        url: None,
        image_url: None,
        rating: None,
        review_count: None,
        promotion: None,
        source: shape.label().to_string(),
        fetched_at,
    }
}

fn normalize_kroger(
    raw: &Value,
    fetched_at: DateTime<Utc>,
) -> Result<NormalizedRecord, ValidationError> {
    let id = required(raw, "productId")?;
    let name = required(raw, "description")?;

    // Prices and sizes live on the first item; products without items are still kept.
    let item = raw.get("items").and_then(|items| items.get(0));
    let price_block = item.and_then(|i| i.get("price"));
    // 0 means "no promotion running"
    let promo_price = price_block
        .and_then(|p| p.get("promo"))
        .and_then(parse_price)
        .filter(|p| *p > 0.0);

    Ok(NormalizedRecord {
        price: price_block.and_then(|p| p.get("regular")).and_then(parse_price),
        promo_price,
        brand: non_empty_text(raw.get("brand")),
        size: non_empty_text(item.and_then(|i| i.get("size"))),
        url: non_empty_text(raw.get("productPageURI"))
            .map(|uri| format!("{}{}", KROGER_SITE, uri)),
        ..bare(RecordShape::Kroger, id, name, fetched_at)
    })
}

fn normalize_open_food_facts(
    raw: &Value,
    fetched_at: DateTime<Utc>,
) -> Result<NormalizedRecord, ValidationError> {
    let id = required(raw, "code")?;
    let name = non_empty_text(raw.get("product_name_en"))
        .or_else(|| non_empty_text(raw.get("product_name")))
        .ok_or(ValidationError::MissingField("product_name_en"))?;

    Ok(NormalizedRecord {
        brand: non_empty_text(raw.get("brands")),
        size: non_empty_text(raw.get("quantity")),
        url: non_empty_text(raw.get("url")),
        image_url: non_empty_text(raw.get("image_url")),
        ..bare(RecordShape::OpenFoodFacts, id, name, fetched_at)
    })
}

/// Search result stacks mix products with ads and placeholder tiles; only
/// `__typename == "Product"` entries are records.
fn normalize_walmart(
    raw: &Value,
    fetched_at: DateTime<Utc>,
) -> Result<NormalizedRecord, ValidationError> {
    match raw.get("__typename").and_then(Value::as_str) {
        None | Some("Product") => {}
        Some(other) => return Err(ValidationError::NotAProduct(other.to_string())),
    }
    let id = required(raw, "usItemId")?;
    let name = required(raw, "name")?;

    let price_info = raw.get("priceInfo");
    let current = price_info
        .and_then(|p| p.get("currentPrice"))
        .and_then(|p| p.get("price"))
        .and_then(parse_price);
    let was = price_info
        .and_then(|p| p.get("wasPrice"))
        .and_then(|p| p.get("price"))
        .and_then(parse_price)
        .filter(|p| *p > 0.0);
    // A higher "was" price means the current one is a rollback.
    let (price, promo_price) = match (was, current) {
        (Some(was), Some(now)) if was > now => (Some(was), Some(now)),
        _ => (current, None),
    };

    Ok(NormalizedRecord {
        price,
        promo_price,
        brand: non_empty_text(raw.get("brand")),
        url: non_empty_text(raw.get("canonicalUrl"))
            .map(|uri| format!("{}{}", WALMART_SITE, uri)),
        image_url: non_empty_text(raw.get("imageInfo").and_then(|i| i.get("thumbnailUrl"))),
        rating: raw.get("averageRating").and_then(Value::as_f64),
        review_count: raw.get("numberOfReviews").and_then(Value::as_u64),
        ..bare(RecordShape::Walmart, id, name, fetched_at)
    })
}

fn normalize_listing(
    raw: &Value,
    fetched_at: DateTime<Utc>,
) -> Result<NormalizedRecord, ValidationError> {
    let id = required(raw, "id")?;
    let name = required(raw, "name")?;

    Ok(NormalizedRecord {
        price: raw.get("price").and_then(parse_price),
        url: non_empty_text(raw.get("url")),
        image_url: non_empty_text(raw.get("image_url")),
        rating: raw.get("rating").and_then(Value::as_f64),
        review_count: raw.get("review_count").and_then(Value::as_u64),
        promotion: non_empty_text(raw.get("promotion")),
        ..bare(RecordShape::Listing, id, name, fetched_at)
    })
}
