use serde_json::Value;
use tracing::{info, warn};

use super::api_types::{ApiArticleEnvelope, ApiArticleList};
use super::types::{
  ArticleDraft, ArticleFilter, ArticlePage, ArticleQuery, KbArticle, KbSearchResults, KbStats,
};
use super::{ack_message, best_effort};
use crate::cache::{CacheSource, QueryKey};
use crate::client::CivicClient;
use crate::http::{ApiError, RequestOptions};
use crate::queue::Target;

/// Prefix shared by every knowledge-base cache key.
const KB_CACHE_PREFIX: &str = "kb_";

/// Cacheable knowledge-base listings.
#[derive(Debug, Clone)]
pub enum KbQueryKey {
  /// Paged article listing with its filters
  Articles {
    page: u32,
    limit: u32,
    search: Option<String>,
    status: Option<String>,
    category: Option<String>,
  },
  /// Most-viewed articles
  Popular { limit: u32 },
}

/// A filter value exactly as it goes on the wire; blank values are not sent.
fn wire_value(value: Option<&str>) -> Option<String> {
  value.filter(|v| !v.trim().is_empty()).map(String::from)
}

impl KbQueryKey {
  fn articles(params: &ArticleQuery) -> Self {
    Self::Articles {
      page: params.page.unwrap_or(1),
      limit: params.limit.unwrap_or(20),
      search: wire_value(params.search.as_deref()),
      status: params.status.map(|s| s.to_string()),
      category: wire_value(params.category.as_deref()),
    }
  }
}

impl QueryKey for KbQueryKey {
  fn namespace(&self) -> &'static str {
    match self {
      Self::Articles { .. } => "kb_articles",
      Self::Popular { .. } => "kb_popular",
    }
  }

  fn canonical(&self) -> String {
    match self {
      Self::Articles {
        page,
        limit,
        search,
        status,
        category,
      } => format!(
        "page={}&limit={}&search={}&status={}&category={}",
        page,
        limit,
        search.as_deref().unwrap_or(""),
        status.as_deref().unwrap_or(""),
        category.as_deref().unwrap_or("")
      ),
      Self::Popular { limit } => format!("limit={}", limit),
    }
  }
}

/// Knowledge-base search and article management.
///
/// Listings are cached; any mutation drops every cached listing.
pub struct KbApi<'a> {
  client: &'a CivicClient,
}

impl<'a> KbApi<'a> {
  pub(crate) fn new(client: &'a CivicClient) -> Self {
    Self { client }
  }

  fn invalidate(&self) {
    match self.client.cache().remove_prefix(KB_CACHE_PREFIX) {
      Ok(removed) if removed > 0 => info!(removed, "invalidated cached KB listings"),
      Ok(_) => {}
      Err(e) => warn!("Failed to invalidate KB cache: {}", e),
    }
  }

  /// Best-effort: an empty result set on failure.
  pub async fn search(
    &self,
    query: &str,
    category: Option<&str>,
    limit: u32,
  ) -> KbSearchResults {
    let options = RequestOptions::new()
      .query("q", query.trim())
      .query_opt("category", category)
      .query("limit", limit);

    let empty = KbSearchResults {
      query: query.to_string(),
      results: Vec::new(),
    };
    let result = self
      .client
      .read::<Option<KbSearchResults>>(Target::Api, "/kb/search", options)
      .await
      .map(|found| found.unwrap_or_else(|| empty.clone()));

    let mut results = best_effort(result, "KB search", empty);
    if results.query.is_empty() {
      results.query = query.to_string();
    }
    results
  }

  /// Paged listing, cached per parameter set. Only articles matching the
  /// requested status are returned, whatever the backend sends.
  pub async fn articles(&self, params: &ArticleQuery) -> Result<ArticlePage, ApiError> {
    let key = KbQueryKey::articles(params).cache_key();
    let options = RequestOptions::new()
      .query("page", params.page.unwrap_or(1))
      .query("limit", params.limit.unwrap_or(20))
      .query_opt("search", params.search.as_deref())
      .query_opt("status", params.status)
      .query_opt("category", params.category.as_deref());

    let client = self.client;
    let fetched = client
      .cache()
      .get_or_fetch(&key, client.kb_ttl(), || async move {
        let list: ApiArticleList = client.read(Target::Api, "/kb/articles", options).await?;
        list.into_page()
      })
      .await
      .map_err(|e| e.or_message("Failed to load articles."))?;

    if fetched.source == CacheSource::Cache {
      info!("KB articles served from cache");
    }

    let mut page = fetched.data;
    if let Some(status) = params.status {
      let filter = ArticleFilter {
        status: Some(status),
        ..Default::default()
      };
      page.articles.retain(|a| filter.matches(a));
    }
    Ok(page)
  }

  /// New articles default to draft.
  pub async fn create_article(&self, draft: &ArticleDraft) -> Result<KbArticle, ApiError> {
    info!(title = %draft.title, "Creating KB article");
    let mut draft = draft.clone();
    draft.status = Some(draft.status.unwrap_or_default());

    let envelope: ApiArticleEnvelope = self
      .client
      .api()
      .post("/kb/articles", RequestOptions::new().json(&draft)?)
      .await
      .map_err(|e| e.or_message("Failed to create article."))?;

    self.invalidate();
    envelope.into_article()
  }

  pub async fn update_article(
    &self,
    article_id: &str,
    updates: &ArticleDraft,
  ) -> Result<KbArticle, ApiError> {
    let envelope: ApiArticleEnvelope = self
      .client
      .api()
      .put(
        &format!("/kb/articles/{}", article_id),
        RequestOptions::new().json(updates)?,
      )
      .await
      .map_err(|e| e.or_message("Failed to update article."))?;

    self.invalidate();
    envelope.into_article()
  }

  pub async fn delete_article(&self, article_id: &str) -> Result<(), ApiError> {
    self
      .client
      .api()
      .delete::<Value>(&format!("/kb/articles/{}", article_id), RequestOptions::new())
      .await
      .map_err(|e| e.or_message("Failed to delete article."))?;

    self.invalidate();
    info!(article_id, "KB article deleted");
    Ok(())
  }

  pub async fn article(&self, article_id: &str) -> Result<KbArticle, ApiError> {
    let envelope: ApiArticleEnvelope = self
      .client
      .read(
        Target::Api,
        &format!("/kb/articles/{}", article_id),
        RequestOptions::new(),
      )
      .await
      .map_err(|e| e.or_message("Article not found or failed to load."))?;
    envelope.into_article()
  }

  /// Best-effort and cached: an empty list on failure.
  pub async fn popular(&self, limit: u32) -> Vec<KbArticle> {
    let key = KbQueryKey::Popular { limit }.cache_key();
    let client = self.client;
    let result = client
      .cache()
      .get_or_fetch(&key, client.kb_ttl(), || async move {
        let list: ApiArticleList = client
          .read(
            Target::Api,
            "/kb/popular",
            RequestOptions::new().query("limit", limit),
          )
          .await?;
        Ok::<_, ApiError>(list.into_page()?.articles)
      })
      .await
      .map(|r| r.data);
    best_effort(result, "Popular articles", Vec::new())
  }

  /// Rebuild the search index (admin).
  pub async fn reindex(&self) -> Result<Option<String>, ApiError> {
    info!("Reindexing knowledge base");
    let response: Value = self
      .client
      .api()
      .post("/kb/reindex", RequestOptions::new())
      .await
      .map_err(|e| e.or_message("Failed to reindex knowledge base."))?;

    self.invalidate();
    Ok(ack_message(&response))
  }

  /// Best-effort: zeroed counts on failure.
  pub async fn stats(&self) -> KbStats {
    let result = self
      .client
      .read::<KbStats>(Target::Api, "/kb/stats", RequestOptions::new())
      .await;
    best_effort(result, "KB stats", KbStats::default())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::types::ArticleStatus;

  #[test]
  fn test_article_keys_follow_sent_parameters() {
    let a = KbQueryKey::articles(&ArticleQuery {
      search: Some("Water".into()),
      status: Some(ArticleStatus::Draft),
      ..Default::default()
    })
    .cache_key();
    let b = KbQueryKey::articles(&ArticleQuery {
      page: Some(1),
      limit: Some(20),
      search: Some("Water".into()),
      category: Some("  ".into()),
      status: Some(ArticleStatus::Draft),
    })
    .cache_key();
    let lowercase = KbQueryKey::articles(&ArticleQuery {
      search: Some("water".into()),
      status: Some(ArticleStatus::Draft),
      ..Default::default()
    })
    .cache_key();
    let published = KbQueryKey::articles(&ArticleQuery {
      status: Some(ArticleStatus::Published),
      ..Default::default()
    })
    .cache_key();

    assert_eq!(a, b);
    assert_ne!(a, lowercase);
    assert_ne!(a, published);
    assert!(a.starts_with(KB_CACHE_PREFIX));
    assert!(KbQueryKey::Popular { limit: 5 }
      .cache_key()
      .starts_with("kb_popular_"));
  }
}
