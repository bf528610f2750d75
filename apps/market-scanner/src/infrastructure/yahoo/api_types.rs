//! Yahoo Finance response types.

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::{
    CompanyProfile, CompanyReport, NewsArticle, ShortInterest, datetime_from_epoch,
};

// ============================================================================
// quoteSummary
// ============================================================================

/// `/v10/finance/quoteSummary/{symbol}` response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteSummaryResponse {
    /// Summary envelope.
    pub quote_summary: QuoteSummary,
}

/// Result list and error.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct QuoteSummary {
    /// One entry per requested symbol.
    pub result: Option<Vec<SummaryModules>>,
    /// Error when the symbol is unknown.
    pub error: Option<SummaryError>,
}

/// Error block.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SummaryError {
    /// Error code, e.g. `Not Found`.
    pub code: Option<String>,
    /// Description.
    pub description: Option<String>,
}

/// Requested modules.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SummaryModules {
    /// Company profile.
    pub asset_profile: Option<AssetProfile>,
    /// Share statistics.
    pub default_key_statistics: Option<KeyStatistics>,
    /// Financials.
    pub financial_data: Option<FinancialData>,
}

/// `assetProfile` module.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AssetProfile {
    /// Country.
    pub country: Option<String>,
    /// Website.
    pub website: Option<String>,
    /// Long business summary.
    pub long_business_summary: Option<String>,
    /// Sector.
    pub sector: Option<String>,
    /// Industry.
    pub industry: Option<String>,
}

/// `defaultKeyStatistics` module.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KeyStatistics {
    /// Float shares.
    pub float_shares: RawValue,
    /// Insider ownership fraction.
    pub held_percent_insiders: RawValue,
    /// Institutional ownership fraction.
    pub held_percent_institutions: RawValue,
    /// Shares short.
    pub shares_short: RawValue,
    /// Days to cover.
    pub short_ratio: RawValue,
    /// Short interest over float.
    pub short_percent_of_float: RawValue,
    /// Short interest over shares outstanding.
    pub shares_percent_shares_out: RawValue,
    /// Shares short in the prior report.
    pub shares_short_prior_month: RawValue,
    /// Prior report date (epoch seconds).
    pub shares_short_previous_month_date: RawValue,
    /// Current report date (epoch seconds).
    pub date_short_interest: RawValue,
}

/// `financialData` module.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FinancialData {
    /// Operating cash flow.
    pub operating_cashflow: RawValue,
}

/// Yahoo's `{"raw": .., "fmt": ..}` number wrapper. `{}` means absent.
#[derive(Debug, Default, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RawValue {
    /// Unformatted value.
    pub raw: Option<f64>,
}

impl RawValue {
    fn decimal(self) -> Option<Decimal> {
        self.raw.and_then(|v| Decimal::try_from(v).ok())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn integer(self) -> Option<i64> {
        self.raw.filter(|v| v.is_finite()).map(|v| v.round() as i64)
    }

    fn date(self) -> Option<chrono::NaiveDate> {
        self.integer()
            .and_then(datetime_from_epoch)
            .map(|dt| dt.date_naive())
    }
}

impl From<SummaryModules> for CompanyReport {
    fn from(modules: SummaryModules) -> Self {
        let asset = modules.asset_profile.unwrap_or_default();
        let stats = modules.default_key_statistics.unwrap_or_default();
        let financial = modules.financial_data.unwrap_or_default();

        Self {
            profile: CompanyProfile {
                country: asset.country,
                website: asset.website,
                summary: asset.long_business_summary,
                sector: asset.sector,
                industry: asset.industry,
                float_shares: stats.float_shares.integer(),
                insider_ownership_pct: stats.held_percent_insiders.decimal(),
                institutional_ownership_pct: stats.held_percent_institutions.decimal(),
                operating_cash_flow: financial.operating_cashflow.decimal(),
            },
            short_interest: ShortInterest {
                short_ratio: stats.short_ratio.decimal(),
                shares_short: stats.shares_short.integer(),
                short_percent_of_float: stats.short_percent_of_float.decimal(),
                shares_short_percent_outstanding: stats.shares_percent_shares_out.decimal(),
                shares_short_prior_month: stats.shares_short_prior_month.integer(),
                prior_month_date: stats.shares_short_previous_month_date.date(),
                report_date: stats.date_short_interest.date(),
            },
        }
    }
}

// ============================================================================
// search
// ============================================================================

/// `/v1/finance/search` response.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SearchResponse {
    /// News results.
    pub news: Vec<SearchNews>,
}

/// One news result.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchNews {
    /// Article identifier.
    pub uuid: Option<String>,
    /// Headline.
    pub title: Option<String>,
    /// Publisher.
    pub publisher: Option<String>,
    /// Link.
    pub link: Option<String>,
    /// Publication time in epoch seconds.
    pub provider_publish_time: Option<i64>,
    /// Content type, e.g. `STORY`.
    #[serde(rename = "type")]
    pub content_type: Option<String>,
    /// Mentioned tickers.
    pub related_tickers: Vec<String>,
}

impl SearchNews {
    /// Convert to an article. Results without an identifier are dropped.
    #[must_use]
    pub fn into_article(self) -> Option<NewsArticle> {
        let id = self.uuid.filter(|id| !id.trim().is_empty())?;
        Some(NewsArticle {
            id,
            title: self.title.map(|t| t.trim().to_string()),
            publisher: self.publisher,
            link: self.link,
            published_at: self.provider_publish_time.and_then(datetime_from_epoch),
            content_type: self.content_type,
            related_tickers: self.related_tickers,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn summary_modules_map_to_report() {
        let body = r#"{
            "assetProfile": {"country": "United States", "sector": "Technology", "longBusinessSummary": "Makes phones."},
            "defaultKeyStatistics": {
                "floatShares": {"raw": 15000000000, "fmt": "15B"},
                "heldPercentInsiders": {"raw": 0.25},
                "sharesShort": {"raw": 100000000},
                "shortRatio": {"raw": 1.5},
                "sharesShortPriorMonth": {},
                "dateShortInterest": {"raw": 1700000000}
            },
            "financialData": {"operatingCashflow": {"raw": 110000000000}}
        }"#;
        let modules: SummaryModules = serde_json::from_str(body).unwrap();
        let report = CompanyReport::from(modules);

        assert_eq!(report.profile.country.as_deref(), Some("United States"));
        assert_eq!(report.profile.website, None);
        assert_eq!(report.profile.summary.as_deref(), Some("Makes phones."));
        assert_eq!(report.profile.float_shares, Some(15_000_000_000));
        assert_eq!(report.profile.insider_ownership_pct, Some(dec!(0.25)));
        assert_eq!(report.profile.operating_cash_flow, Some(dec!(110000000000)));
        assert_eq!(report.short_interest.short_ratio, Some(dec!(1.5)));
        assert_eq!(report.short_interest.shares_short, Some(100_000_000));
        assert_eq!(report.short_interest.shares_short_prior_month, None);
        assert_eq!(
            report.short_interest.report_date,
            NaiveDate::from_ymd_opt(2023, 11, 14)
        );
    }

    #[test]
    fn missing_modules_yield_empty_report() {
        let report = CompanyReport::from(SummaryModules::default());
        assert_eq!(report, CompanyReport::default());
    }

    #[test]
    fn news_without_id_is_dropped() {
        let with_id: SearchNews = serde_json::from_str(
            r#"{"uuid": "n-1", "title": "  Headline ", "type": "STORY", "providerPublishTime": 1700000000, "relatedTickers": ["AAPL"]}"#,
        )
        .unwrap();
        let article = with_id.into_article().unwrap();
        assert_eq!(article.id, "n-1");
        assert_eq!(article.title.as_deref(), Some("Headline"));
        assert_eq!(article.content_type.as_deref(), Some("STORY"));
        assert_eq!(article.related_tickers, vec!["AAPL".to_string()]);
        assert!(article.published_at.is_some());

        let without_id: SearchNews = serde_json::from_str(r#"{"title": "x"}"#).unwrap();
        assert!(without_id.into_article().is_none());
    }
}
