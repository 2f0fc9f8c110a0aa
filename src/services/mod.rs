//! External service integrations

pub mod cache;
pub mod openai;
pub mod radarr;
pub mod rate_limiter;
pub mod ratings;

pub use cache::{CacheKey, FetchCache};
pub use openai::{ChatBackend, ChatMessage, ChatRequest, LlmError, OpenAiClient, ToolCall};
pub use radarr::{
    AddDefaults, AddMoviePayload, LibraryApi, LibraryMovie, RadarrClient, build_add_payload,
    extract_ratings,
};
pub use rate_limiter::{RateLimitConfig, RateLimitedClient, RetryConfig, retry_async};
pub use ratings::{LibraryRatingsFetcher, RatingsSource};
