//! PostgreSQL store.
//!
//! Uses `PostgreSQL` via `SQLx`. The schema is bootstrapped idempotently at
//! startup; append-once rows (history, news) rely on their primary keys
//! with `ON CONFLICT DO NOTHING`.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row};
use tracing::{debug, info};

use crate::application::ports::{CredentialStore, StoreError, TickerStore};
use crate::domain::{
    CompanyProfile, Credential, EntityId, Fundamentals, HistoryEntry, MarketSession, NewsItem,
    ScanRecord, ShortInterest, Symbol, TrackedTicker,
};
use crate::infrastructure::config::DatabaseSettings;

const SCHEMA: &str = include_str!("schema.sql");

/// Store backed by a PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect a pool using `settings`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be connected.
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .min_connections(settings.min_connections)
            .max_connections(settings.max_connections)
            .connect(&settings.url())
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        info!(
            host = %settings.host,
            database = %settings.name,
            max_connections = settings.max_connections,
            "PostgreSQL connection pool initialized"
        );

        Ok(Self { pool })
    }

    /// Create a store with an existing pool.
    #[must_use]
    pub const fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create missing tables and indexes.
    ///
    /// # Errors
    ///
    /// Returns an error if a DDL statement fails.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(query_error)?;
        debug!("Database schema verified");
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TickerStore for PostgresStore {
    async fn find_ticker(&self, symbol: &Symbol) -> Result<Option<TrackedTicker>, StoreError> {
        let row = sqlx::query(
            r"
            SELECT entity_id, symbol, company_name, market_cap, avg_volume_1d,
                   avg_volume_10d, avg_volume_3m, country, website, summary, sector,
                   industry, float_shares, insider_ownership_pct,
                   institutional_ownership_pct, operating_cash_flow, last_quote_time
            FROM tracked_tickers
            WHERE symbol = $1
            ",
        )
        .bind(symbol.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        row.as_ref().map(row_to_ticker).transpose()
    }

    async fn insert_ticker(&self, ticker: &TrackedTicker) -> Result<(), StoreError> {
        let f = &ticker.fundamentals;
        let p = &ticker.profile;
        sqlx::query(
            r"
            INSERT INTO tracked_tickers (
                entity_id, symbol, company_name, market_cap, avg_volume_1d,
                avg_volume_10d, avg_volume_3m, country, website, summary, sector,
                industry, float_shares, insider_ownership_pct,
                institutional_ownership_pct, operating_cash_flow, last_quote_time
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ",
        )
        .bind(ticker.entity_id.as_uuid())
        .bind(ticker.symbol.as_str())
        .bind(&ticker.company_name)
        .bind(f.market_cap)
        .bind(f.avg_volume_1d)
        .bind(f.avg_volume_10d)
        .bind(f.avg_volume_3m)
        .bind(&p.country)
        .bind(&p.website)
        .bind(&p.summary)
        .bind(&p.sector)
        .bind(&p.industry)
        .bind(p.float_shares)
        .bind(p.insider_ownership_pct)
        .bind(p.institutional_ownership_pct)
        .bind(p.operating_cash_flow)
        .bind(ticker.last_quote_time)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        debug!(symbol = %ticker.symbol, entity_id = %ticker.entity_id, "Ticker inserted");
        Ok(())
    }

    async fn update_ticker(&self, ticker: &TrackedTicker) -> Result<(), StoreError> {
        let f = &ticker.fundamentals;
        let p = &ticker.profile;
        let result = sqlx::query(
            r"
            UPDATE tracked_tickers SET
                company_name = $2,
                market_cap = $3,
                avg_volume_1d = $4,
                avg_volume_10d = $5,
                avg_volume_3m = $6,
                country = $7,
                website = $8,
                summary = $9,
                sector = $10,
                industry = $11,
                float_shares = $12,
                insider_ownership_pct = $13,
                institutional_ownership_pct = $14,
                operating_cash_flow = $15,
                last_quote_time = $16,
                updated_at = NOW()
            WHERE entity_id = $1
            ",
        )
        .bind(ticker.entity_id.as_uuid())
        .bind(&ticker.company_name)
        .bind(f.market_cap)
        .bind(f.avg_volume_1d)
        .bind(f.avg_volume_10d)
        .bind(f.avg_volume_3m)
        .bind(&p.country)
        .bind(&p.website)
        .bind(&p.summary)
        .bind(&p.sector)
        .bind(&p.industry)
        .bind(p.float_shares)
        .bind(p.insider_ownership_pct)
        .bind(p.institutional_ownership_pct)
        .bind(p.operating_cash_flow)
        .bind(ticker.last_quote_time)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                kind: "ticker",
                key: ticker.entity_id.to_string(),
            });
        }
        Ok(())
    }

    async fn insert_short_interest(
        &self,
        entity_id: EntityId,
        short_interest: &ShortInterest,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO short_interest (
                entity_id, short_ratio, shares_short, short_percent_of_float,
                shares_short_percent_outstanding, shares_short_prior_month,
                prior_month_date, report_date
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(entity_id.as_uuid())
        .bind(short_interest.short_ratio)
        .bind(short_interest.shares_short)
        .bind(short_interest.short_percent_of_float)
        .bind(short_interest.shares_short_percent_outstanding)
        .bind(short_interest.shares_short_prior_month)
        .bind(short_interest.prior_month_date)
        .bind(short_interest.report_date)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;
        Ok(())
    }

    async fn update_short_interest(
        &self,
        entity_id: EntityId,
        short_interest: &ShortInterest,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r"
            UPDATE short_interest SET
                short_ratio = $2,
                shares_short = $3,
                short_percent_of_float = $4,
                shares_short_percent_outstanding = $5,
                shares_short_prior_month = $6,
                prior_month_date = $7,
                report_date = $8,
                updated_at = NOW()
            WHERE entity_id = $1
            ",
        )
        .bind(entity_id.as_uuid())
        .bind(short_interest.short_ratio)
        .bind(short_interest.shares_short)
        .bind(short_interest.short_percent_of_float)
        .bind(short_interest.shares_short_percent_outstanding)
        .bind(short_interest.shares_short_prior_month)
        .bind(short_interest.prior_month_date)
        .bind(short_interest.report_date)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                kind: "short_interest",
                key: entity_id.to_string(),
            });
        }
        Ok(())
    }

    async fn find_scan_record(
        &self,
        session: MarketSession,
        entity_id: EntityId,
        scan_date: NaiveDate,
    ) -> Result<Option<ScanRecord>, StoreError> {
        let row = sqlx::query(
            r"
            SELECT session, entity_id, scan_date, symbol, quote_time, last_price,
                   change_percent, volume
            FROM scan_records
            WHERE session = $1 AND entity_id = $2 AND scan_date = $3
            ",
        )
        .bind(session.as_str())
        .bind(entity_id.as_uuid())
        .bind(scan_date)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        row.as_ref().map(row_to_scan_record).transpose()
    }

    async fn insert_scan_record(&self, record: &ScanRecord) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO scan_records (
                session, entity_id, scan_date, symbol, quote_time, last_price,
                change_percent, volume
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(record.session.as_str())
        .bind(record.entity_id.as_uuid())
        .bind(record.scan_date)
        .bind(record.symbol.as_str())
        .bind(record.quote_time)
        .bind(record.last_price)
        .bind(record.change_percent)
        .bind(record.volume)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;
        Ok(())
    }

    async fn update_scan_record(&self, record: &ScanRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            r"
            UPDATE scan_records SET
                quote_time = $4,
                last_price = $5,
                change_percent = $6,
                volume = $7,
                updated_at = NOW()
            WHERE session = $1 AND entity_id = $2 AND scan_date = $3
            ",
        )
        .bind(record.session.as_str())
        .bind(record.entity_id.as_uuid())
        .bind(record.scan_date)
        .bind(record.quote_time)
        .bind(record.last_price)
        .bind(record.change_percent)
        .bind(record.volume)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                kind: "scan_record",
                key: format!("{}/{}/{}", record.session, record.entity_id, record.scan_date),
            });
        }
        Ok(())
    }

    async fn history_exists(
        &self,
        entity_id: EntityId,
        date: NaiveDate,
    ) -> Result<bool, StoreError> {
        let row = sqlx::query(
            r"
            SELECT EXISTS (
                SELECT 1 FROM ticker_history WHERE entity_id = $1 AND observed_on = $2
            ) AS present
            ",
        )
        .bind(entity_id.as_uuid())
        .bind(date)
        .fetch_one(&self.pool)
        .await
        .map_err(query_error)?;

        column(&row, "present")
    }

    async fn insert_history(&self, entry: &HistoryEntry) -> Result<bool, StoreError> {
        let iso_week = i32::try_from(entry.iso_week)
            .map_err(|e| StoreError::Serialization(format!("iso_week: {e}")))?;
        let result = sqlx::query(
            r"
            INSERT INTO ticker_history (entity_id, observed_on, symbol, iso_week)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (entity_id, observed_on) DO NOTHING
            ",
        )
        .bind(entry.entity_id.as_uuid())
        .bind(entry.date)
        .bind(entry.symbol.as_str())
        .bind(iso_week)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn news_ids(&self, entity_id: EntityId) -> Result<HashSet<String>, StoreError> {
        let rows = sqlx::query("SELECT news_id FROM ticker_news WHERE entity_id = $1")
            .bind(entity_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;

        rows.iter().map(|row| column(row, "news_id")).collect()
    }

    async fn insert_news(&self, item: &NewsItem) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r"
            INSERT INTO ticker_news (
                entity_id, news_id, title, publisher, link, published_at,
                content_type, related_tickers
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (entity_id, news_id) DO NOTHING
            ",
        )
        .bind(item.entity_id.as_uuid())
        .bind(&item.news_id)
        .bind(&item.title)
        .bind(&item.publisher)
        .bind(&item.link)
        .bind(item.published_at)
        .bind(&item.content_type)
        .bind(&item.related_tickers)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl CredentialStore for PostgresStore {
    async fn latest_credential(&self) -> Result<Option<Credential>, StoreError> {
        let row = sqlx::query(
            r"
            SELECT access_token, refresh_token, token_type, scope, id_token,
                   issued_at, expires_at, authenticated_at
            FROM credentials
            ORDER BY issued_at DESC
            LIMIT 1
            ",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        row.as_ref()
            .map(|row| {
                Ok(Credential::restore(
                    column(row, "access_token")?,
                    column(row, "refresh_token")?,
                    column(row, "token_type")?,
                    column(row, "scope")?,
                    column(row, "id_token")?,
                    column(row, "issued_at")?,
                    column(row, "expires_at")?,
                    column(row, "authenticated_at")?,
                ))
            })
            .transpose()
    }

    async fn append_credential(&self, credential: &Credential) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO credentials (
                access_token, refresh_token, token_type, scope, id_token,
                issued_at, expires_at, authenticated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(credential.access_token())
        .bind(credential.refresh_token())
        .bind(credential.token_type())
        .bind(credential.scope())
        .bind(credential.id_token())
        .bind(credential.issued_at())
        .bind(credential.expires_at())
        .bind(credential.authenticated_at())
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        debug!(issued_at = %credential.issued_at(), "Credential appended");
        Ok(())
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get::<T, _>(name)
        .map_err(|e| StoreError::Serialization(format!("{name}: {e}")))
}

fn symbol_column(row: &PgRow) -> Result<Symbol, StoreError> {
    let raw: String = column(row, "symbol")?;
    Symbol::new(&raw).map_err(|e| StoreError::Integrity(e.to_string()))
}

fn row_to_ticker(row: &PgRow) -> Result<TrackedTicker, StoreError> {
    Ok(TrackedTicker {
        entity_id: EntityId::from_uuid(column(row, "entity_id")?),
        symbol: symbol_column(row)?,
        company_name: column(row, "company_name")?,
        fundamentals: Fundamentals {
            market_cap: column(row, "market_cap")?,
            avg_volume_1d: column(row, "avg_volume_1d")?,
            avg_volume_10d: column(row, "avg_volume_10d")?,
            avg_volume_3m: column(row, "avg_volume_3m")?,
        },
        profile: CompanyProfile {
            country: column(row, "country")?,
            website: column(row, "website")?,
            summary: column(row, "summary")?,
            sector: column(row, "sector")?,
            industry: column(row, "industry")?,
            float_shares: column(row, "float_shares")?,
            insider_ownership_pct: column(row, "insider_ownership_pct")?,
            institutional_ownership_pct: column(row, "institutional_ownership_pct")?,
            operating_cash_flow: column(row, "operating_cash_flow")?,
        },
        last_quote_time: column(row, "last_quote_time")?,
    })
}

fn row_to_scan_record(row: &PgRow) -> Result<ScanRecord, StoreError> {
    let session: String = column(row, "session")?;
    Ok(ScanRecord {
        entity_id: EntityId::from_uuid(column(row, "entity_id")?),
        symbol: symbol_column(row)?,
        session: session
            .parse()
            .map_err(|e: crate::domain::DomainError| StoreError::Integrity(e.to_string()))?,
        scan_date: column(row, "scan_date")?,
        quote_time: column(row, "quote_time")?,
        last_price: column(row, "last_price")?,
        change_percent: column(row, "change_percent")?,
        volume: column(row, "volume")?,
    })
}

fn query_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() || db.is_foreign_key_violation() => {
            StoreError::Integrity(db.message().to_string())
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Connection(err.to_string())
        }
        _ => StoreError::Query(err.to_string()),
    }
}
