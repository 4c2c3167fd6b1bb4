// Offset-based page walking with a hard page ceiling
use crate::model::{FetchError, FetchRequest, RawRecord};
use crate::retry::RetryPolicy;
use crate::scraper::Source;

use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct Paginator {
    pub retry: RetryPolicy,
    pub max_pages: u32,
    pub page_delay: Duration,
}

impl Paginator {
    pub fn new(retry: RetryPolicy, max_pages: u32, page_delay: Duration) -> Self {
        Self {
            retry,
            max_pages: max_pages.max(1),
            page_delay,
        }
    }

    /// Fetches every page for `base` starting at offset 0.
    ///
    /// Stops on an empty page, when `start + limit` reaches the reported total,
    /// when the offset stops advancing, when a page repeats the previous one,
    /// or after `max_pages` pages. Metadata that would overflow the offset also
    /// ends the walk. Any error that survives the retry policy is returned and
    /// the pages fetched so far are discarded.
    ///
    /// When the source answers with a different page size than requested, the
    /// following requests use the size it reported.
    pub async fn fetch_all(
        &self,
        source: &dyn Source,
        base: &FetchRequest,
    ) -> Result<Vec<RawRecord>, FetchError> {
        let mut records: Vec<RawRecord> = Vec::new();
        let mut request = base.at_offset(0);
        let mut last_page_len = 0;
        let mut pages = 0;

        loop {
            let page = self.retry.execute(|| source.fetch_page(&request)).await?;
            pages += 1;

            if page.records.is_empty() {
                debug!("'{}': empty page at offset {}", base.term, request.offset);
                break;
            }
            if last_page_len == page.records.len()
                && records[records.len() - last_page_len..] == page.records[..]
            {
                warn!(
                    "'{}': page at offset {} repeats the previous page, stopping",
                    base.term, request.offset
                );
                break;
            }

            let received = page.records.len() as u64;
            last_page_len = page.records.len();
            records.extend(page.records);

            let step = if page.meta.limit > 0 { page.meta.limit } else { received };
            let Some(next_offset) = page.meta.start.checked_add(step) else {
                warn!(
                    "'{}': page metadata overflows the offset (start={}, limit={}), stopping",
                    base.term, page.meta.start, page.meta.limit
                );
                break;
            };

            if let Some(total) = page.meta.total {
                if next_offset >= total {
                    break;
                }
            }
            if next_offset <= request.offset {
                warn!(
                    "'{}': offset did not advance past {} (start={}, limit={}), stopping",
                    base.term, request.offset, page.meta.start, page.meta.limit
                );
                break;
            }
            if pages >= self.max_pages {
                warn!(
                    "'{}': hit max page limit ({}) with {} records, stopping",
                    base.term,
                    self.max_pages,
                    records.len()
                );
                break;
            }

            let mut next = base.at_offset(next_offset);
            match u32::try_from(page.meta.limit) {
                Ok(limit) if limit > 0 && limit != request.limit => {
                    debug!(
                        "'{}': source answered with page size {} instead of {}",
                        base.term, limit, request.limit
                    );
                    next.limit = limit;
                }
                _ => next.limit = request.limit,
            }
            request = next;
            sleep(self.page_delay).await;
        }

        Ok(records)
    }
}
