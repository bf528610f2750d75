//! StockAnalysis Screener Adapter
//!
//! Scrapes the ranked tables published on stockanalysis.com. The ticker is
//! the second cell of each body row of the main table; rows that do not
//! yield a usable symbol are skipped.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};

use crate::application::ports::{ProviderError, RankedCategory, RankedListPort};
use crate::domain::{MarketSession, Symbol};
use crate::infrastructure::metrics::{Provider, record_provider_error, record_provider_request};

/// Public site.
pub const DEFAULT_BASE_URL: &str = "https://stockanalysis.com";

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";
const TICKER_COLUMN: usize = 1;

/// [`RankedListPort`] backed by stockanalysis.com pages.
#[derive(Debug, Clone)]
pub struct StockAnalysisScraper {
    client: Client,
    base_url: String,
}

impl StockAnalysisScraper {
    /// Scraper against the public site.
    pub fn new(timeout: Duration) -> Result<Self, ProviderError> {
        Self::with_base_url(DEFAULT_BASE_URL, timeout)
    }

    /// Scraper against a custom host.
    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ProviderError::Transport {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn page(&self, category: RankedCategory) -> Result<String, ProviderError> {
        let url = format!("{}{}", self.base_url, page_path(category));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProviderError::Transport {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: format!("GET {url} failed"),
            });
        }
        response.text().await.map_err(|e| ProviderError::Transport {
            message: e.to_string(),
        })
    }
}

const fn page_path(category: RankedCategory) -> &'static str {
    match category {
        RankedCategory::PremarketGainers => "/markets/premarket/",
        RankedCategory::Gainers => "/markets/gainers/",
        RankedCategory::MostActive => "/markets/active/",
    }
}

/// Tickers of the main table in row order.
fn parse_tickers(html: &str) -> Result<Vec<Symbol>, ProviderError> {
    let document = Html::parse_document(html);
    let selector = |css: &str| {
        Selector::parse(css).map_err(|e| ProviderError::Decode {
            message: format!("invalid selector {css}: {e}"),
        })
    };
    let main_table = selector("table#main-table")?;
    let any_table = selector("table")?;
    let rows = selector("tbody tr")?;
    let cells = selector("td")?;

    let table = document
        .select(&main_table)
        .next()
        .or_else(|| document.select(&any_table).next())
        .ok_or_else(|| ProviderError::Decode {
            message: "no ranked table on page".to_string(),
        })?;

    let tickers = table
        .select(&rows)
        .filter_map(|row| {
            let cell = row.select(&cells).nth(TICKER_COLUMN)?;
            let text: String = cell.text().collect();
            Symbol::new(text.trim()).ok()
        })
        .collect();
    Ok(tickers)
}

#[async_trait]
impl RankedListPort for StockAnalysisScraper {
    async fn ranked_tickers(
        &self,
        session: MarketSession,
        category: RankedCategory,
    ) -> Result<Vec<Symbol>, ProviderError> {
        record_provider_request(Provider::StockAnalysis, category.as_str());
        let result = match self.page(category).await {
            Ok(html) => parse_tickers(&html),
            Err(err) => Err(err),
        };

        match &result {
            Ok(tickers) => tracing::debug!(
                session = session.as_str(),
                category = category.as_str(),
                count = tickers.len(),
                "Ranked list scraped"
            ),
            Err(err) => record_provider_error(Provider::StockAnalysis, err.kind()),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const GAINERS_PAGE: &str = r#"
        <html><body>
          <table class="other"><tbody><tr><td>1</td><td>NOPE</td></tr></tbody></table>
          <table id="main-table" class="symbol-table">
            <thead><tr><th>No.</th><th>Symbol</th><th>Company</th></tr></thead>
            <tbody>
              <tr><td>1</td><td><a href="/stocks/abcd/">ABCD</a></td><td>Abcd Corp</td></tr>
              <tr><td>2</td><td> efg </td><td>Efg Inc</td></tr>
              <tr><td>3</td></tr>
              <tr><td>4</td><td>   </td><td>Blank</td></tr>
              <tr><td>5</td><td>BRK.B</td><td>Berkshire</td></tr>
            </tbody>
          </table>
        </body></html>
    "#;

    fn symbols(raw: &[&str]) -> Vec<Symbol> {
        raw.iter().map(|s| Symbol::new(s).unwrap()).collect()
    }

    #[test]
    fn second_column_of_main_table() {
        let tickers = parse_tickers(GAINERS_PAGE).unwrap();
        assert_eq!(tickers, symbols(&["ABCD", "EFG", "BRK.B"]));
    }

    #[test]
    fn falls_back_to_first_table() {
        let html = "<table><tbody><tr><td>1</td><td>XYZ</td></tr></tbody></table>";
        assert_eq!(parse_tickers(html).unwrap(), symbols(&["XYZ"]));
    }

    #[test]
    fn page_without_table_is_a_decode_error() {
        assert!(matches!(
            parse_tickers("<html><body><p>maintenance</p></body></html>"),
            Err(ProviderError::Decode { .. })
        ));
    }

    #[tokio::test]
    async fn category_selects_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/markets/gainers/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(GAINERS_PAGE))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/markets/active/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<table id=\"main-table\"><tbody><tr><td>1</td><td>ACT</td></tr></tbody></table>",
            ))
            .mount(&server)
            .await;

        let scraper = StockAnalysisScraper::with_base_url(&server.uri(), Duration::from_secs(5))
            .unwrap();
        let gainers = scraper
            .ranked_tickers(MarketSession::RegularMarket, RankedCategory::Gainers)
            .await
            .unwrap();
        assert_eq!(gainers.len(), 3);

        let active = scraper
            .ranked_tickers(MarketSession::RegularMarket, RankedCategory::MostActive)
            .await
            .unwrap();
        assert_eq!(active, symbols(&["ACT"]));

        let length = scraper
            .length(MarketSession::RegularMarket, RankedCategory::Gainers)
            .await
            .unwrap();
        assert_eq!(length, 3);
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let scraper = StockAnalysisScraper::with_base_url(&server.uri(), Duration::from_secs(5))
            .unwrap();
        let err = scraper
            .ranked_tickers(MarketSession::PreMarket, RankedCategory::PremarketGainers)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Api { status: 503, .. }));
    }
}
