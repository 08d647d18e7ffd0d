//! Cursor-following pagination.
//!
//! Listings are fully materialized before they are returned: callers sort and
//! filter the complete set, and a failing page discards everything fetched so
//! far.

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EditorError, Result};

/// Default number of pages fetched before giving up on a listing.
pub const DEFAULT_PAGE_CEILING: usize = 50;

/// Opaque pointer to a page, usually the path plus query the service handed
/// back in its `paging.next` field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageCursor(String);

impl PageCursor {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for PageCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One fetched page: its items in server order and the cursor of the next
/// page, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<PageCursor>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next: Option<PageCursor>) -> Self {
        Self { items, next }
    }

    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            next: self.next,
        }
    }
}

/// Raw listing envelope used by the service: `{ data, paging: { next } }`.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub paging: Option<Paging>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Paging {
    #[serde(default)]
    pub next: Option<String>,
}

impl<T> From<Envelope<T>> for Page<T> {
    fn from(envelope: Envelope<T>) -> Self {
        let next = envelope
            .paging
            .and_then(|paging| paging.next)
            .filter(|next| !next.trim().is_empty())
            .map(PageCursor::new);
        Page::new(envelope.data, next)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Paginator {
    ceiling: usize,
}

impl Default for Paginator {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_CEILING)
    }
}

impl Paginator {
    /// `ceiling` is the maximum number of pages a single listing may span.
    pub fn new(ceiling: usize) -> Self {
        Self {
            ceiling: ceiling.max(1),
        }
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Fetches `first` and every page after it, returning all items in the
    /// order the pages arrived.
    ///
    /// A failed page aborts the listing with its 1-based index attached. A
    /// cursor still present after `ceiling` pages yields
    /// [`EditorError::PaginationExhausted`].
    pub async fn collect<T, F, Fut>(&self, first: PageCursor, mut fetch_page: F) -> Result<Vec<T>>
    where
        F: FnMut(PageCursor) -> Fut,
        Fut: Future<Output = Result<Page<T>>>,
    {
        let mut items = Vec::new();
        let mut cursor = Some(first);
        let mut fetched = 0usize;

        while let Some(current) = cursor {
            if fetched == self.ceiling {
                return Err(EditorError::PaginationExhausted {
                    ceiling: self.ceiling,
                });
            }
            fetched += 1;
            debug!(page = fetched, cursor = %current, "fetching page");
            let page = fetch_page(current)
                .await
                .map_err(|err| err.at_page(fetched))?;
            items.extend(page.items);
            cursor = page.next;
        }

        debug!(pages = fetched, items = items.len(), "listing complete");
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn numbered_pages(sizes: &[usize]) -> Vec<Page<usize>> {
        let mut next_value = 0;
        let count = sizes.len();
        sizes
            .iter()
            .enumerate()
            .map(|(index, size)| {
                let items: Vec<usize> = (next_value..next_value + size).collect();
                next_value += size;
                let next = (index + 1 < count).then(|| PageCursor::new(format!("page={}", index + 2)));
                Page::new(items, next)
            })
            .collect()
    }

    #[tokio::test]
    async fn collects_three_pages_in_order() {
        let pages = numbered_pages(&[100, 100, 42]);
        let calls = Cell::new(0usize);
        let items = Paginator::default()
            .collect(PageCursor::new("page=1"), |cursor| {
                let index = calls.get();
                calls.set(index + 1);
                assert_eq!(cursor.as_str(), format!("page={}", index + 1));
                let page = pages[index].clone();
                async move { Ok(page) }
            })
            .await
            .unwrap();

        assert_eq!(calls.get(), 3);
        assert_eq!(items.len(), 242);
        let expected: Vec<usize> = pages.iter().flat_map(|page| page.items.clone()).collect();
        assert_eq!(items, expected);
    }

    #[tokio::test]
    async fn single_page_without_cursor_stops_immediately() {
        let calls = Cell::new(0usize);
        let items = Paginator::default()
            .collect(PageCursor::new("first"), |_| {
                calls.set(calls.get() + 1);
                async { Ok(Page::last(vec!["only"])) }
            })
            .await
            .unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(items, vec!["only"]);
    }

    #[tokio::test]
    async fn endless_cursor_trips_the_ceiling() {
        let calls = Cell::new(0usize);
        let err = Paginator::new(5)
            .collect(PageCursor::new("loop"), |cursor| {
                calls.set(calls.get() + 1);
                async move { Ok(Page::new(vec![1u8], Some(cursor))) }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EditorError::PaginationExhausted { ceiling: 5 }));
        assert_eq!(calls.get(), 5);
    }

    #[tokio::test]
    async fn exactly_ceiling_pages_is_allowed() {
        let pages = numbered_pages(&[1, 1, 1]);
        let calls = Cell::new(0usize);
        let items = Paginator::new(3)
            .collect(PageCursor::new("page=1"), |_| {
                let page = pages[calls.get()].clone();
                calls.set(calls.get() + 1);
                async move { Ok(page) }
            })
            .await
            .unwrap();
        assert_eq!(items, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn failing_page_discards_partial_results() {
        let calls = Cell::new(0usize);
        let err = Paginator::default()
            .collect(PageCursor::new("page=1"), |_| {
                calls.set(calls.get() + 1);
                let attempt = calls.get();
                async move {
                    if attempt == 2 {
                        Err(EditorError::from_status(503, "unavailable"))
                    } else {
                        Ok(Page::new(vec![attempt], Some(PageCursor::new("more"))))
                    }
                }
            })
            .await
            .unwrap_err();
        match err {
            EditorError::RemoteFetchFailed { page, status, .. } => {
                assert_eq!(page, Some(2));
                assert_eq!(status, Some(503));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn envelope_without_next_is_last_page() {
        let envelope: Envelope<u32> =
            serde_json::from_str(r#"{"data":[1,2],"paging":{"next":null}}"#).unwrap();
        let page = Page::from(envelope);
        assert_eq!(page.items, vec![1, 2]);
        assert!(page.next.is_none());
    }

    #[test]
    fn envelope_with_next_yields_cursor() {
        let envelope: Envelope<u32> = serde_json::from_str(
            r#"{"data":[],"paging":{"next":"/me/videos?page=2"}}"#,
        )
        .unwrap();
        let page = Page::from(envelope);
        assert_eq!(page.next, Some(PageCursor::new("/me/videos?page=2")));
    }
}
