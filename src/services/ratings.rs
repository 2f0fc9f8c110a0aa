//! Rating fetcher boundary
//!
//! Per-title rating retrieval for the quality analysis engine. Providers
//! report a typed rating or nothing at all - never a default numeric
//! placeholder. Results are cached for a short window keyed by
//! (source, title, year).

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use super::cache::{CacheKey, FetchCache};
use super::radarr::{LibraryApi, extract_ratings};
use crate::models::RatingSet;

/// Per-title rating lookup. An empty `RatingSet` means no provider reported;
/// the quality engine turns that into an explicit insufficient-data verdict.
#[async_trait]
pub trait RatingsSource: Send + Sync {
    async fn ratings_for(&self, title: &str, year: Option<i32>) -> Result<RatingSet>;
}

/// Rating fetcher backed by the library API's lookup payload, which carries
/// the IMDb, Rotten Tomatoes, TMDB, and Metacritic figures in one response.
pub struct LibraryRatingsFetcher {
    library: Arc<dyn LibraryApi>,
    cache: FetchCache,
}

impl LibraryRatingsFetcher {
    pub fn new(library: Arc<dyn LibraryApi>, cache_ttl: Duration) -> Self {
        Self {
            library,
            cache: FetchCache::new(cache_ttl),
        }
    }
}

#[async_trait]
impl RatingsSource for LibraryRatingsFetcher {
    async fn ratings_for(&self, title: &str, year: Option<i32>) -> Result<RatingSet> {
        let key = CacheKey::for_title("ratings", title, year);
        if let Some(cached) = self.cache.get(&key)
            && let Ok(ratings) = serde_json::from_str(&cached)
        {
            return Ok(ratings);
        }

        let term = match year {
            Some(year) => format!("{title} {year}"),
            None => title.to_string(),
        };
        let results = self.library.lookup(&term).await?;

        let ratings = results
            .iter()
            .find(|movie| match (movie.year, year) {
                (Some(a), Some(b)) => (a - b).abs() <= 1,
                _ => true,
            })
            .map(extract_ratings)
            .unwrap_or_default();

        debug!(
            title = %title,
            providers = ratings.provider_count(),
            "ratings fetched"
        );

        if let Ok(serialized) = serde_json::to_string(&ratings) {
            self.cache.insert(key, serialized);
        }
        Ok(ratings)
    }
}
