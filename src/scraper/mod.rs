pub mod fetcher;
pub mod kroger;
pub mod listing;
pub mod openfoodfacts;
pub mod traits;
pub mod walmart;

#[cfg(test)]
pub mod mock;

pub use fetcher::HttpFetcher;
pub use kroger::KrogerSource;
pub use listing::ListingSource;
pub use openfoodfacts::OpenFoodFactsSource;
pub use traits::Source;
pub use walmart::WalmartSource;
