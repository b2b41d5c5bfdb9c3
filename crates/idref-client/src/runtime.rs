//! Bridge from the synchronous client traits to async `reqwest`.

use std::future::Future;

pub(crate) const NO_RUNTIME: &str = "no async runtime available for HTTP request";

/// Run `fut` to completion on the ambient Tokio runtime.
///
/// Returns `None` when the calling thread has no runtime handle. Must not be
/// called from an async task; use `spawn_blocking` there.
pub(crate) fn block_on<F: Future>(fut: F) -> Option<F::Output> {
    let rt = tokio::runtime::Handle::try_current().ok()?;
    Some(rt.block_on(fut))
}
