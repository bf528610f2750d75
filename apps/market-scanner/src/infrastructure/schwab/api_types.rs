//! Schwab API response types.
//!
//! Every field the scanner reads is optional; shape drift degrades single
//! values to `None` instead of failing the whole payload.

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::Fundamentals;

// ============================================================================
// Quotes
// ============================================================================

/// One entry of the `/{symbol}/quotes` response, keyed by symbol.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QuoteEnvelope {
    /// Price and volume block.
    pub quote: Option<QuoteBlock>,
    /// Reference data block.
    pub reference: Option<ReferenceBlock>,
}

/// Quote block.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QuoteBlock {
    /// Last traded price.
    pub last_price: Option<f64>,
    /// Percent change from the previous close.
    pub net_percent_change: Option<f64>,
    /// Volume traded today.
    pub total_volume: Option<i64>,
    /// Quote timestamp in epoch seconds or milliseconds.
    pub quote_time: Option<i64>,
}

/// Reference block.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReferenceBlock {
    /// Company name.
    pub description: Option<String>,
}

// ============================================================================
// Instruments
// ============================================================================

/// `/instruments?projection=fundamental` response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InstrumentsResponse {
    /// Matching instruments.
    pub instruments: Vec<Instrument>,
}

/// One instrument.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Instrument {
    /// Symbol.
    pub symbol: Option<String>,
    /// Fundamental projection.
    pub fundamental: Option<FundamentalBlock>,
}

/// Fundamental projection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FundamentalBlock {
    /// Market capitalization.
    #[serde(rename = "marketCap")]
    pub market_cap: Option<f64>,
    /// Average volume over the last day.
    #[serde(rename = "avg1DayVolume")]
    pub avg_1_day_volume: Option<f64>,
    /// Average volume over ten days.
    #[serde(rename = "avg10DaysVolume")]
    pub avg_10_days_volume: Option<f64>,
    /// Average volume over three months.
    #[serde(rename = "avg3MonthVolume")]
    pub avg_3_month_volume: Option<f64>,
}

impl From<FundamentalBlock> for Fundamentals {
    fn from(block: FundamentalBlock) -> Self {
        Self {
            market_cap: block.market_cap.and_then(to_decimal),
            avg_volume_1d: block.avg_1_day_volume.and_then(to_volume),
            avg_volume_10d: block.avg_10_days_volume.and_then(to_volume),
            avg_volume_3m: block.avg_3_month_volume.and_then(to_volume),
        }
    }
}

// ============================================================================
// Movers
// ============================================================================

/// `/movers/{index}` response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MoversResponse {
    /// Ranked entries.
    pub screeners: Vec<Screener>,
}

/// One ranked entry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Screener {
    /// Symbol.
    pub symbol: Option<String>,
}

// ============================================================================
// Errors
// ============================================================================

/// Error body. Market data and OAuth endpoints use different shapes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SchwabErrorResponse {
    /// Plain message.
    pub message: Option<String>,
    /// OAuth error code.
    pub error: Option<String>,
    /// OAuth error description.
    pub error_description: Option<String>,
    /// Market data error list.
    pub errors: Vec<SchwabErrorDetail>,
}

/// Market data error entry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SchwabErrorDetail {
    /// Short title.
    pub title: Option<String>,
    /// Details.
    pub detail: Option<String>,
}

impl SchwabErrorResponse {
    /// Most specific message available.
    #[must_use]
    pub fn summary(self) -> Option<String> {
        if let Some(description) = self.error_description {
            return Some(description);
        }
        if let Some(message) = self.message.or(self.error) {
            return Some(message);
        }
        self.errors
            .into_iter()
            .find_map(|detail| detail.detail.or(detail.title))
    }
}

/// Finite floats only.
pub fn to_decimal(value: f64) -> Option<Decimal> {
    Decimal::try_from(value).ok()
}

#[allow(clippy::cast_possible_truncation)]
fn to_volume(value: f64) -> Option<i64> {
    value.is_finite().then(|| value.round() as i64)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn quote_payload_decodes() {
        let body = r#"{
            "AAPL": {
                "assetMainType": "EQUITY",
                "quote": {"lastPrice": 150.25, "netPercentChange": 2.5, "totalVolume": 1200000, "quoteTime": 1700000000000},
                "reference": {"description": "Apple Inc"}
            }
        }"#;
        let parsed: HashMap<String, QuoteEnvelope> = serde_json::from_str(body).unwrap();
        let entry = &parsed["AAPL"];
        let quote = entry.quote.as_ref().unwrap();
        assert_eq!(quote.total_volume, Some(1_200_000));
        assert_eq!(quote.quote_time, Some(1_700_000_000_000));
        assert_eq!(
            entry.reference.as_ref().unwrap().description.as_deref(),
            Some("Apple Inc")
        );
    }

    #[test]
    fn invalid_symbols_payload_decodes_to_empty_entry() {
        let body = r#"{"errors": {"invalidSymbols": ["ZZZZ"]}}"#;
        let parsed: HashMap<String, QuoteEnvelope> = serde_json::from_str(body).unwrap();
        assert!(parsed.get("ZZZZ").is_none());
    }

    #[test]
    fn fundamentals_convert_with_rounding() {
        let block: FundamentalBlock = serde_json::from_str(
            r#"{"marketCap": 2500.5, "avg1DayVolume": 1000.4, "avg10DaysVolume": 5.0E7}"#,
        )
        .unwrap();
        let fundamentals = Fundamentals::from(block);
        assert_eq!(fundamentals.market_cap, Some(dec!(2500.5)));
        assert_eq!(fundamentals.avg_volume_1d, Some(1000));
        assert_eq!(fundamentals.avg_volume_10d, Some(50_000_000));
        assert_eq!(fundamentals.avg_volume_3m, None);
    }

    #[test]
    fn error_summary_prefers_description() {
        let oauth: SchwabErrorResponse = serde_json::from_str(
            r#"{"error": "invalid_grant", "error_description": "refresh token expired"}"#,
        )
        .unwrap();
        assert_eq!(oauth.summary().as_deref(), Some("refresh token expired"));

        let data: SchwabErrorResponse =
            serde_json::from_str(r#"{"errors": [{"title": "Bad Request", "detail": "bad symbol"}]}"#)
                .unwrap();
        assert_eq!(data.summary().as_deref(), Some("bad symbol"));
    }
}
