//! Injected item source
//!
//! The loader is the only I/O the core performs. Any `Fn(start, end) -> Future`
//! closure is a loader, so callers can plug in an HTTP client, a database
//! query or a test fixture without a wrapper type.

use std::future::Future;

use futures_util::future::BoxFuture;

use super::RawItem;

/// Outcome of one loader call
pub type LoadResult<C> = Result<Vec<RawItem<C>>, LoadError>;

/// Async source of items for a time range
///
/// Must be safe to call concurrently for distinct ranges.
pub trait Loader<C>: Send + Sync + 'static {
    /// Fetch all items with `start_ms <= timestamp < end_ms`
    fn load(&self, start_ms: i64, end_ms: i64) -> BoxFuture<'static, LoadResult<C>>;
}

impl<C, F, Fut> Loader<C> for F
where
    F: Fn(i64, i64) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = LoadResult<C>> + Send + 'static,
{
    fn load(&self, start_ms: i64, end_ms: i64) -> BoxFuture<'static, LoadResult<C>> {
        Box::pin(self(start_ms, end_ms))
    }
}

/// Loader rejection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    Network(String),
    Timeout,
    Parse(String),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Network(e) => write!(f, "Network error: {}", e),
            LoadError::Timeout => write!(f, "Request timed out"),
            LoadError::Parse(e) => write!(f, "Parse error: {}", e),
        }
    }
}

impl std::error::Error for LoadError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_closure_is_a_loader() {
        let loader = |start: i64, end: i64| async move {
            Ok::<_, LoadError>(vec![RawItem::new(1, start, format!("{}-{}", start, end))])
        };
        let items = loader.load(0, 10).await.unwrap();
        assert_eq!(items[0].content, "0-10");
    }

    #[tokio::test]
    async fn test_rejection_is_passed_through() {
        let loader = |_: i64, _: i64| async move { LoadResult::<String>::Err(LoadError::Timeout) };
        assert_eq!(loader.load(0, 10).await, Err(LoadError::Timeout));
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            LoadError::Network("refused".into()).to_string(),
            "Network error: refused"
        );
        assert_eq!(LoadError::Parse("eof".into()).to_string(), "Parse error: eof");
    }
}
