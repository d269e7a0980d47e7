use std::future::Future;
use std::ops::ControlFlow;

use tracing::{debug, warn};

use crate::config::MAX_PAGES_PER_WALK;
use crate::error::{ProviderError, ProviderResult};
use crate::provider::{Page, PageCursor};

/// How a walk ended.
#[derive(Debug)]
pub enum WalkEnd {
    /// The provider returned no further cursor.
    Exhausted,
    /// The accumulator asked to stop (records fell out of the time window).
    Stopped,
    /// The page cap was reached with a cursor still pending.
    PageCap,
    /// A page fetch failed; everything accumulated before it is kept.
    Failed(ProviderError),
}

#[derive(Debug)]
pub struct WalkOutcome {
    /// Pages successfully fetched and accumulated.
    pub pages: u64,
    pub end: WalkEnd,
}

impl WalkOutcome {
    pub fn hit_page_cap(&self) -> bool {
        matches!(self.end, WalkEnd::PageCap)
    }

    pub fn error(&self) -> Option<&ProviderError> {
        match &self.end {
            WalkEnd::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Drives a paginated endpoint to completion, bounded by a page cap.
#[derive(Debug, Clone, Copy)]
pub struct PaginationWalker {
    page_cap: u64,
}

impl Default for PaginationWalker {
    fn default() -> Self {
        Self::new(MAX_PAGES_PER_WALK)
    }
}

impl PaginationWalker {
    pub fn new(page_cap: u64) -> Self {
        Self { page_cap: page_cap.max(1) }
    }

    /// Fetch pages starting at `initial`, handing each page's records to `accumulate`.
    /// Fetch errors end the walk and are returned in the outcome, never propagated.
    pub async fn walk<T, F, Fut, A>(
        &self,
        label: &str,
        initial: PageCursor,
        mut fetch_page: F,
        mut accumulate: A,
    ) -> WalkOutcome
    where
        F: FnMut(PageCursor) -> Fut,
        Fut: Future<Output = ProviderResult<Page<T>>>,
        A: FnMut(Vec<T>) -> ControlFlow<()>,
    {
        let mut cursor = initial;
        let mut pages = 0u64;

        loop {
            if pages >= self.page_cap {
                warn!(
                    "{label}: page cap of {} reached, stopping with cursor {cursor:?} still pending",
                    self.page_cap
                );
                return WalkOutcome { pages, end: WalkEnd::PageCap };
            }

            let page = match fetch_page(cursor).await {
                Ok(p) => p,
                Err(e) => {
                    debug!("{label}: page {} failed: {e}", pages + 1);
                    return WalkOutcome { pages, end: WalkEnd::Failed(e) };
                }
            };
            pages += 1;
            debug!("{label}: page {pages} returned {} records", page.records.len());

            if accumulate(page.records).is_break() {
                return WalkOutcome { pages, end: WalkEnd::Stopped };
            }

            match page.next.filter(|c| !c.is_empty()) {
                Some(next) => cursor = next,
                None => return WalkOutcome { pages, end: WalkEnd::Exhausted },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use std::cell::Cell;

    fn page_of(n: usize, next: Option<PageCursor>) -> Page<u32> {
        Page::new(vec![1; n], next)
    }

    #[tokio::test]
    async fn walks_until_cursor_runs_out() {
        let walker = PaginationWalker::new(100);
        let mut total = 0usize;
        let outcome = walker
            .walk(
                "test",
                PageCursor::start_token(),
                |cursor| async move {
                    Ok(match cursor {
                        PageCursor::Token(t) if t.is_empty() => page_of(3, Some(PageCursor::Token("a".into()))),
                        PageCursor::Token(t) if t == "a" => page_of(2, Some(PageCursor::Token("b".into()))),
                        _ => page_of(1, Some(PageCursor::Token(String::new()))),
                    })
                },
                |records| {
                    total += records.len();
                    ControlFlow::Continue(())
                },
            )
            .await;
        assert_eq!(outcome.pages, 3);
        assert!(matches!(outcome.end, WalkEnd::Exhausted));
        assert_eq!(total, 6);
    }

    #[tokio::test]
    async fn never_ending_provider_is_bounded_by_cap() {
        let walker = PaginationWalker::new(25);
        let fetches = Cell::new(0u32);
        let outcome = walker
            .walk(
                "test",
                PageCursor::Page(1),
                |cursor| {
                    fetches.set(fetches.get() + 1);
                    async move { Ok(page_of(1, Some(PageCursor::Page(cursor.page_number() + 1)))) }
                },
                |_| ControlFlow::Continue(()),
            )
            .await;
        assert!(outcome.hit_page_cap());
        assert_eq!(outcome.pages, 25);
        assert_eq!(fetches.get(), 25);
    }

    #[tokio::test]
    async fn error_keeps_pages_already_accumulated() {
        let walker = PaginationWalker::default();
        let mut total = 0usize;
        let outcome = walker
            .walk(
                "test",
                PageCursor::Page(1),
                |cursor| async move {
                    let n = cursor.page_number();
                    if n == 3 {
                        return Err(ProviderError::Status {
                            status: StatusCode::BAD_REQUEST,
                            body: "boom".into(),
                        });
                    }
                    Ok(page_of(10, (n < 5).then(|| PageCursor::Page(n + 1))))
                },
                |records| {
                    total += records.len();
                    ControlFlow::Continue(())
                },
            )
            .await;
        assert!(outcome.error().is_some());
        assert_eq!(outcome.pages, 2);
        assert_eq!(total, 20);
    }

    #[tokio::test]
    async fn accumulator_break_stops_further_requests() {
        let walker = PaginationWalker::default();
        let fetches = Cell::new(0u32);
        let outcome = walker
            .walk(
                "test",
                PageCursor::Page(1),
                |cursor| {
                    fetches.set(fetches.get() + 1);
                    async move { Ok(page_of(4, Some(PageCursor::Page(cursor.page_number() + 1)))) }
                },
                |_| {
                    if fetches.get() == 2 { ControlFlow::Break(()) } else { ControlFlow::Continue(()) }
                },
            )
            .await;
        assert!(matches!(outcome.end, WalkEnd::Stopped));
        assert_eq!(fetches.get(), 2);
    }
}
