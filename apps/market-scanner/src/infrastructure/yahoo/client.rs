//! Yahoo Finance client.
//!
//! quoteSummary requires a session cookie plus a matching crumb. The crumb
//! is fetched lazily, shared by all callers and discarded when Yahoo
//! answers 401 so the next call performs a fresh handshake.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use super::api_types::{QuoteSummaryResponse, SearchNews, SearchResponse};
use crate::application::ports::{CompanyDataPort, ProviderError};
use crate::domain::{CompanyReport, NewsArticle, Symbol};
use crate::infrastructure::metrics::{Provider, record_provider_error, record_provider_request};

/// Cookie-issuing host.
pub const DEFAULT_COOKIE_URL: &str = "https://fc.yahoo.com";
/// API host.
pub const DEFAULT_API_BASE_URL: &str = "https://query2.finance.yahoo.com";

const SUMMARY_MODULES: &str = "assetProfile,defaultKeyStatistics,financialData,price";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";
const PROVIDER: &str = "yahoo";

/// [`CompanyDataPort`] backed by the public Yahoo Finance API.
pub struct YahooFinanceClient {
    client: Client,
    cookie_url: String,
    api_base_url: String,
    news_count: u32,
    crumb: Mutex<Option<String>>,
}

impl YahooFinanceClient {
    /// Client against the public Yahoo hosts.
    pub fn new(timeout: Duration) -> Result<Self, ProviderError> {
        Self::with_base_urls(DEFAULT_COOKIE_URL, DEFAULT_API_BASE_URL, timeout)
    }

    /// Client against custom hosts.
    pub fn with_base_urls(
        cookie_url: &str,
        api_base_url: &str,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ProviderError::Transport {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            cookie_url: cookie_url.trim_end_matches('/').to_string(),
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            news_count: 10,
            crumb: Mutex::new(None),
        })
    }

    /// Number of articles requested per symbol.
    #[must_use]
    pub const fn with_news_count(mut self, news_count: u32) -> Self {
        self.news_count = news_count;
        self
    }

    async fn crumb(&self) -> Result<String, ProviderError> {
        let mut cached = self.crumb.lock().await;
        if let Some(crumb) = cached.as_ref() {
            return Ok(crumb.clone());
        }

        // The cookie host answers 404 while still setting the session cookie.
        self.client
            .get(&self.cookie_url)
            .send()
            .await
            .map_err(transport)?;

        let response = self
            .client
            .get(format!("{}/v1/test/getcrumb", self.api_base_url))
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        let crumb = response.text().await.map_err(transport)?.trim().to_string();
        if !status.is_success() || crumb.is_empty() || crumb.starts_with('<') {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: "crumb handshake failed".to_string(),
            });
        }

        tracing::debug!("Yahoo crumb acquired");
        *cached = Some(crumb.clone());
        Ok(crumb)
    }

    async fn invalidate_crumb(&self) {
        *self.crumb.lock().await = None;
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ProviderError> {
        record_provider_request(Provider::Yahoo, endpoint);
        let result = self.fetch(url, query).await;
        if let Err(err) = &result {
            record_provider_error(Provider::Yahoo, err.kind());
        }
        result
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ProviderError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if status.is_success() {
            let text = response.text().await.map_err(transport)?;
            return serde_json::from_str(&text).map_err(|e| ProviderError::Decode {
                message: e.to_string(),
            });
        }

        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let message = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                ProviderError::Unauthorized { provider: PROVIDER }
            }
            StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited {
                retry_after_secs: retry_after.unwrap_or(60),
            },
            _ => ProviderError::Api {
                status: status.as_u16(),
                message,
            },
        })
    }

    async fn quote_summary(&self, symbol: &Symbol) -> Result<QuoteSummaryResponse, ProviderError> {
        let url = format!("{}/v10/finance/quoteSummary/{symbol}", self.api_base_url);
        let crumb = self.crumb().await?;
        let query = [("modules", SUMMARY_MODULES), ("crumb", crumb.as_str())];

        match self.get_json("quote_summary", &url, &query).await {
            Err(ProviderError::Unauthorized { .. }) => {
                tracing::debug!(%symbol, "Yahoo crumb rejected, renewing");
                self.invalidate_crumb().await;
                let crumb = self.crumb().await?;
                let query = [("modules", SUMMARY_MODULES), ("crumb", crumb.as_str())];
                self.get_json("quote_summary", &url, &query).await
            }
            other => other,
        }
    }
}

fn transport(err: reqwest::Error) -> ProviderError {
    ProviderError::Transport {
        message: err.to_string(),
    }
}

#[async_trait]
impl CompanyDataPort for YahooFinanceClient {
    async fn company(&self, symbol: &Symbol) -> Result<CompanyReport, ProviderError> {
        let response = match self.quote_summary(symbol).await {
            Err(ProviderError::Api { status: 404, .. }) => {
                return Err(ProviderError::NotFound {
                    symbol: symbol.to_string(),
                });
            }
            other => other?,
        };

        let summary = response.quote_summary;
        if let Some(error) = summary.error {
            tracing::debug!(
                %symbol,
                code = error.code.as_deref().unwrap_or_default(),
                description = error.description.as_deref().unwrap_or_default(),
                "Yahoo reported an error for symbol"
            );
        }

        summary
            .result
            .and_then(|modules| modules.into_iter().next())
            .map(CompanyReport::from)
            .ok_or_else(|| ProviderError::NotFound {
                symbol: symbol.to_string(),
            })
    }

    async fn news(&self, symbol: &Symbol) -> Result<Vec<NewsArticle>, ProviderError> {
        let url = format!("{}/v1/finance/search", self.api_base_url);
        let news_count = self.news_count.to_string();
        let response: SearchResponse = self
            .get_json(
                "search",
                &url,
                &[
                    ("q", symbol.as_str()),
                    ("quotesCount", "0"),
                    ("newsCount", news_count.as_str()),
                ],
            )
            .await?;

        Ok(response
            .news
            .into_iter()
            .filter_map(SearchNews::into_article)
            .collect())
    }
}

impl std::fmt::Debug for YahooFinanceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YahooFinanceClient")
            .field("api_base_url", &self.api_base_url)
            .field("news_count", &self.news_count)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    async fn handshake(server: &MockServer, crumb: &str) {
        Mock::given(method("GET"))
            .and(path("/cookie"))
            .respond_with(ResponseTemplate::new(404).insert_header("set-cookie", "A3=session; Path=/"))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/test/getcrumb"))
            .respond_with(ResponseTemplate::new(200).set_body_string(crumb))
            .mount(server)
            .await;
    }

    fn client(server: &MockServer) -> YahooFinanceClient {
        YahooFinanceClient::with_base_urls(
            &format!("{}/cookie", server.uri()),
            &server.uri(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn symbol(raw: &str) -> Symbol {
        Symbol::new(raw).unwrap()
    }

    #[tokio::test]
    async fn company_uses_crumb_and_modules() {
        let server = MockServer::start().await;
        handshake(&server, "crumb-1").await;
        Mock::given(method("GET"))
            .and(path("/v10/finance/quoteSummary/AAPL"))
            .and(query_param("crumb", "crumb-1"))
            .and(query_param("modules", SUMMARY_MODULES))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "quoteSummary": {
                    "result": [{
                        "assetProfile": {"country": "United States", "industry": "Consumer Electronics"},
                        "defaultKeyStatistics": {"sharesShort": {"raw": 1000}}
                    }],
                    "error": null
                }
            })))
            .expect(2)
            .mount(&server)
            .await;

        let client = client(&server);
        let report = client.company(&symbol("AAPL")).await.unwrap();
        assert_eq!(report.profile.industry.as_deref(), Some("Consumer Electronics"));
        assert_eq!(report.short_interest.shares_short, Some(1000));

        // second call reuses the cached crumb
        client.company(&symbol("AAPL")).await.unwrap();
        let crumb_requests = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.path() == "/v1/test/getcrumb")
            .count();
        assert_eq!(crumb_requests, 1);
    }

    #[tokio::test]
    async fn rejected_crumb_is_renewed_once() {
        let server = MockServer::start().await;
        handshake(&server, "crumb-2").await;
        Mock::given(method("GET"))
            .and(path("/v10/finance/quoteSummary/MSFT"))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v10/finance/quoteSummary/MSFT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "quoteSummary": {"result": [{}], "error": null}
            })))
            .mount(&server)
            .await;

        let report = client(&server).company(&symbol("MSFT")).await.unwrap();
        assert_eq!(report, CompanyReport::default());
    }

    #[tokio::test]
    async fn unknown_symbol_is_not_found() {
        let server = MockServer::start().await;
        handshake(&server, "crumb-3").await;
        Mock::given(method("GET"))
            .and(path("/v10/finance/quoteSummary/ZZZZ"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "quoteSummary": {
                    "result": null,
                    "error": {"code": "Not Found", "description": "Quote not found for symbol: ZZZZ"}
                }
            })))
            .mount(&server)
            .await;

        let err = client(&server).company(&symbol("ZZZZ")).await.unwrap_err();
        assert_eq!(
            err,
            ProviderError::NotFound {
                symbol: "ZZZZ".to_string()
            }
        );
    }

    #[tokio::test]
    async fn failed_handshake_is_an_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/test/getcrumb"))
            .respond_with(ResponseTemplate::new(429).set_body_string("Too Many Requests"))
            .mount(&server)
            .await;

        let err = client(&server).company(&symbol("AAPL")).await.unwrap_err();
        assert!(matches!(err, ProviderError::Api { status: 429, .. }));
    }

    #[tokio::test]
    async fn news_keeps_provider_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/finance/search"))
            .and(query_param("q", "AAPL"))
            .and(query_param("newsCount", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "news": [
                    {"uuid": "b", "title": "Second story", "publisher": "Reuters", "providerPublishTime": 1700000000},
                    {"title": "No id"},
                    {"uuid": "a", "title": "First story", "relatedTickers": ["AAPL", "MSFT"]}
                ]
            })))
            .mount(&server)
            .await;

        let news = client(&server)
            .with_news_count(3)
            .news(&symbol("AAPL"))
            .await
            .unwrap();
        let ids: Vec<_> = news.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(news[0].publisher.as_deref(), Some("Reuters"));
        assert_eq!(news[1].related_tickers.len(), 2);
    }

    #[tokio::test]
    async fn news_rate_limit_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/finance/search"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
            .mount(&server)
            .await;

        let err = client(&server).news(&symbol("AAPL")).await.unwrap_err();
        assert_eq!(err, ProviderError::RateLimited { retry_after_secs: 7 });
    }
}
