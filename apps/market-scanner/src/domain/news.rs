//! News articles and stored news items.

use chrono::{DateTime, Utc};

use super::ticker::EntityId;

/// Article as returned by a news source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsArticle {
    /// Provider-assigned identifier, unique per provider.
    pub id: String,
    /// Headline.
    pub title: Option<String>,
    /// Publisher display name.
    pub publisher: Option<String>,
    /// Canonical link.
    pub link: Option<String>,
    /// Publication time.
    pub published_at: Option<DateTime<Utc>>,
    /// Content type (story, video, ...).
    pub content_type: Option<String>,
    /// Other tickers the article mentions.
    pub related_tickers: Vec<String>,
}

/// News article attached to a tracked ticker. Inserted at most once per
/// `(entity_id, news_id)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsItem {
    /// Owning ticker.
    pub entity_id: EntityId,
    /// Provider news identifier.
    pub news_id: String,
    /// Headline.
    pub title: Option<String>,
    /// Publisher display name.
    pub publisher: Option<String>,
    /// Canonical link.
    pub link: Option<String>,
    /// Publication time.
    pub published_at: Option<DateTime<Utc>>,
    /// Content type.
    pub content_type: Option<String>,
    /// Other tickers the article mentions.
    pub related_tickers: Vec<String>,
}

impl NewsItem {
    /// Attach `article` to `entity_id`.
    #[must_use]
    pub fn attach(entity_id: EntityId, article: NewsArticle) -> Self {
        Self {
            entity_id,
            news_id: article.id,
            title: article.title,
            publisher: article.publisher,
            link: article.link,
            published_at: article.published_at,
            content_type: article.content_type,
            related_tickers: article.related_tickers,
        }
    }
}
