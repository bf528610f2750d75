//! Company Data Port (Driven Port)
//!
//! Profile, short interest and news from the public company data source.

use async_trait::async_trait;

use super::market_data_port::ProviderError;
use crate::domain::{CompanyReport, NewsArticle, Symbol};

/// Company profile and news provider.
#[async_trait]
pub trait CompanyDataPort: Send + Sync {
    /// Profile and short-interest figures.
    async fn company(&self, symbol: &Symbol) -> Result<CompanyReport, ProviderError>;

    /// Recent articles in provider order.
    async fn news(&self, symbol: &Symbol) -> Result<Vec<NewsArticle>, ProviderError>;
}
