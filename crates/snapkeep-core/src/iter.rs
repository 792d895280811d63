//! Paginated key enumeration.
//!
//! Backends list keys one bounded page at a time and resume from an
//! exclusive marker. [`PageIterator`] stitches those pages into one ordered,
//! duplicate-free sequence:
//!
//! ```text
//! next()
//!   ├── bound reached?            → end
//!   ├── page exhausted?           → marker := last key of page, drop page
//!   ├── no page?                  → enumerate(prefix, marker, hint)
//!   ├── fetched page empty?       → end
//!   └── yield page[index], index += 1
//! ```
//!
//! The marker is always the exact last key of the exhausted page, so the
//! next fetch starts strictly after it and no key is skipped or repeated at
//! a page boundary.

use std::ops::ControlFlow;

use tracing::trace;

use crate::backend::Backend;
use crate::error::{SnapError, SnapResult};

/// Page size requested from the backend when none is set.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Pull-based iterator over the keys of a [`Backend`].
pub struct PageIterator<'a, B: ?Sized> {
    backend: &'a B,
    prefix: String,
    marker: String,
    /// `None` means unbounded.
    max_keys: Option<usize>,
    page_size: usize,
    emitted: usize,
    /// Current page; `None` when a fresh fetch is required.
    page: Option<Vec<String>>,
    /// Bound requested for the current page.
    page_bound: usize,
    index: usize,
}

impl<'a, B: Backend + ?Sized> PageIterator<'a, B> {
    /// Iterate keys under `prefix` strictly after `marker`, yielding at most
    /// `max_keys` (`None` for all of them).
    pub fn new(
        backend: &'a B,
        prefix: impl Into<String>,
        marker: impl Into<String>,
        max_keys: Option<usize>,
    ) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
            marker: marker.into(),
            max_keys,
            page_size: DEFAULT_PAGE_SIZE,
            emitted: 0,
            page: None,
            page_bound: 0,
            index: 0,
        }
    }

    /// Override the page size hint passed to the backend.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Next key, or `None` once the sequence is exhausted or the bound is hit.
    pub async fn next(&mut self) -> SnapResult<Option<String>> {
        if self.max_keys.is_some_and(|max| self.emitted >= max) {
            return Ok(None);
        }

        self.release_exhausted_page();

        if self.page.is_none() {
            self.fetch_page().await?;
        }

        let Some(page) = self.page.as_ref() else {
            return Ok(None);
        };

        // An empty page ends the sequence. It stays loaded so later calls
        // keep reporting the end without refetching.
        let Some(key) = page.get(self.index) else {
            return Ok(None);
        };

        let key = key.clone();
        self.index += 1;
        self.emitted += 1;
        Ok(Some(key))
    }

    /// Number of keys in the current page.
    pub fn len(&self) -> usize {
        self.page.as_ref().map_or(0, Vec::len)
    }

    /// Whether no page is loaded or the loaded page is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bound requested for the current page.
    pub fn cap(&self) -> usize {
        if self.page.is_some() { self.page_bound } else { 0 }
    }

    /// Number of keys yielded so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Current resume marker.
    pub fn marker(&self) -> &str {
        &self.marker
    }

    fn release_exhausted_page(&mut self) {
        let Some(page) = self.page.as_mut() else {
            return;
        };
        if self.index < page.len() {
            return;
        }
        let Some(last) = page.pop() else {
            // Empty page: end of sequence, keep it.
            return;
        };

        self.marker = last;
        self.page = None;
        self.index = 0;
        self.page_bound = 0;
    }

    async fn fetch_page(&mut self) -> SnapResult<()> {
        let hint = match self.max_keys {
            Some(max) => self.page_size.min(max.saturating_sub(self.emitted)).max(1),
            None => self.page_size,
        };

        let keys = self
            .backend
            .enumerate(&self.prefix, &self.marker, hint)
            .await?;

        if let Some(first) = keys.first() {
            if !self.marker.is_empty() && first.as_str() <= self.marker.as_str() {
                return Err(SnapError::Backend(format!(
                    "enumeration returned {first:?}, which does not follow marker {:?}",
                    self.marker
                )));
            }
        }

        trace!(
            prefix = %self.prefix,
            marker = %self.marker,
            hint,
            fetched = keys.len(),
            "key page fetched"
        );

        self.page = Some(keys);
        self.page_bound = hint;
        self.index = 0;
        Ok(())
    }
}

/// Visit every key under `prefix` after `marker`, up to `max_keys`.
///
/// `visit` returns [`ControlFlow::Break`] to stop early; that is not an
/// error.
pub async fn for_each<B, F>(
    backend: &B,
    prefix: &str,
    marker: &str,
    max_keys: Option<usize>,
    mut visit: F,
) -> SnapResult<()>
where
    B: Backend + ?Sized,
    F: FnMut(String) -> SnapResult<ControlFlow<()>>,
{
    let mut iter = PageIterator::new(backend, prefix, marker, max_keys);
    while let Some(key) = iter.next().await? {
        if visit(key)?.is_break() {
            break;
        }
    }
    Ok(())
}

/// Collect keys under `prefix` after `marker`, up to `max_keys`, in order.
pub async fn list<B>(
    backend: &B,
    prefix: &str,
    marker: &str,
    max_keys: Option<usize>,
) -> SnapResult<Vec<String>>
where
    B: Backend + ?Sized,
{
    let mut iter = PageIterator::new(backend, prefix, marker, max_keys);
    let mut keys: Vec<String> = Vec::new();
    while let Some(key) = iter.next().await? {
        if keys.is_empty() {
            keys.reserve(iter.len());
        }
        keys.push(key);
    }
    Ok(keys)
}

/// The first key under `prefix` strictly after `after`.
///
/// `Ok(None)` means there is no such key; fetch failures are errors.
pub async fn next_key<B>(backend: &B, prefix: &str, after: &str) -> SnapResult<Option<String>>
where
    B: Backend + ?Sized,
{
    PageIterator::new(backend, prefix, after, Some(1)).next().await
}
