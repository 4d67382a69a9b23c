//! Retrieval collaborator seam.

use std::future::Future;

use stats_core::models::{RetrievalResult, SourceQuery};
use stats_core::Result;

/// Fetches the records for one source query.
///
/// Implementations see only server-applicable parameters; deferred
/// dimensions never reach them. "Nothing matched" must be reported as
/// [`RetrievalResult::NoMatchingData`], not as an error.
pub trait StatsFetcher: Send + Sync + 'static {
    fn fetch(&self, query: SourceQuery) -> impl Future<Output = Result<RetrievalResult>> + Send;
}
