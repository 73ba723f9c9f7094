//! Page-number pagination over listing endpoints.
//!
//! A [`Paginator`] issues `GET path?page=N&size=S` through a
//! [`ServiceClient`], hands each response to an extractor that returns the page's
//! items and the server-reported total, and stops once
//! `pages_fetched * size >= total` or a page comes back empty.
//!
//! The total is re-read from every page. If it shrinks between pages (for
//! example because of concurrent deletes) the walk may stop early or skip
//! items; this is not guarded against.

use crate::context::CallContext;
use crate::error::{Error, Result};
use crate::transport::{RequestSpec, ResponseEnvelope, ServiceClient};
use serde::de::DeserializeOwned;
use std::fmt;
use tracing::debug;

/// Items of one page plus the total the server reported with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Items on this page
    pub items: Vec<T>,
    /// Total number of items across all pages
    pub total: u64,
}

impl<T> Page<T> {
    /// Create a page.
    #[must_use]
    pub fn new(items: Vec<T>, total: u64) -> Self {
        Self { items, total }
    }
}

/// Turns a successful response into a [`Page`].
pub type PageExtractor<T> = Box<dyn Fn(&ResponseEnvelope) -> Result<Page<T>> + Send + Sync>;

/// Items gathered by [`Paginator::all`], with the error that stopped the walk.
#[derive(Debug, Clone, PartialEq)]
pub struct Collected<T> {
    /// Items in arrival order
    pub items: Vec<T>,
    /// First error encountered, if the walk did not finish
    pub error: Option<Error>,
}

impl<T> Collected<T> {
    /// Returns true if every page was fetched.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// The items, or the error if the walk stopped early.
    ///
    /// # Errors
    ///
    /// Returns the error that stopped the walk; the partial items are dropped.
    pub fn into_result(self) -> Result<Vec<T>> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.items),
        }
    }
}

/// Stateful walker over one page-numbered listing endpoint.
pub struct Paginator<'a, T> {
    client: &'a ServiceClient,
    path: String,
    page_size: u32,
    first_page: u64,
    pages_fetched: u64,
    page_param: String,
    size_param: String,
    query: Vec<(String, String)>,
    extractor: PageExtractor<T>,
    total: Option<u64>,
    has_more: bool,
}

impl<T> fmt::Debug for Paginator<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Paginator")
            .field("service", &self.client.service())
            .field("path", &self.path)
            .field("page_size", &self.page_size)
            .field("current_page", &self.current_page())
            .field("total", &self.total)
            .field("has_more", &self.has_more)
            .finish_non_exhaustive()
    }
}

impl<'a, T> Paginator<'a, T> {
    /// Create a paginator that decodes pages with `extractor`.
    ///
    /// A `page_size` of 0 yields an exhausted paginator.
    pub fn new<F>(client: &'a ServiceClient, path: impl Into<String>, page_size: u32, extractor: F) -> Self
    where
        F: Fn(&ResponseEnvelope) -> Result<Page<T>> + Send + Sync + 'static,
    {
        Self {
            client,
            path: path.into(),
            page_size,
            first_page: 0,
            pages_fetched: 0,
            page_param: "page".to_string(),
            size_param: "size".to_string(),
            query: Vec::new(),
            extractor: Box::new(extractor),
            total: None,
            has_more: page_size > 0,
        }
    }

    /// Create a paginator that decodes each body as `R` and maps it to a page.
    pub fn json<R, F>(
        client: &'a ServiceClient,
        path: impl Into<String>,
        page_size: u32,
        to_page: F,
    ) -> Self
    where
        R: DeserializeOwned,
        F: Fn(R) -> Page<T> + Send + Sync + 'static,
    {
        Self::new(client, path, page_size, move |response| {
            let listing: R = response.json()?;
            Ok(to_page(listing))
        })
    }

    /// Number the first page 1 instead of 0.
    #[must_use]
    pub fn one_based(mut self) -> Self {
        self.first_page = 1;
        self
    }

    /// Use different query parameter names for the page number and size.
    #[must_use]
    pub fn with_param_names(mut self, page: impl Into<String>, size: impl Into<String>) -> Self {
        self.page_param = page.into();
        self.size_param = size.into();
        self
    }

    /// Add a fixed query parameter sent with every page request.
    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((name.into(), value.to_string()));
        self
    }

    /// Seed the total before the first request. A hint of 0 exhausts the
    /// paginator without any call.
    #[must_use]
    pub fn with_total_hint(mut self, total: u64) -> Self {
        self.total = Some(total);
        self.has_more = self.page_size > 0 && total > 0;
        self
    }

    /// Returns true while another page may hold items.
    #[must_use]
    pub const fn has_more_pages(&self) -> bool {
        self.has_more
    }

    /// Page number the next request will ask for.
    #[must_use]
    pub const fn current_page(&self) -> u64 {
        self.first_page + self.pages_fetched
    }

    /// Total reported by the most recent page.
    #[must_use]
    pub const fn total(&self) -> Option<u64> {
        self.total
    }

    /// Fetch the next page.
    ///
    /// Returns an empty list without a request once the paginator is
    /// exhausted. On error the page counter does not advance.
    ///
    /// # Errors
    ///
    /// Returns the transport error or the extractor's error.
    pub async fn next_page(&mut self, ctx: &CallContext) -> Result<Vec<T>> {
        if !self.has_more {
            return Ok(Vec::new());
        }

        let page = self.current_page();
        let spec = RequestSpec::get(self.path.as_str())
            .query_pairs(self.query.iter().map(|(k, v)| (k.as_str(), v)))
            .query(self.page_param.as_str(), page)
            .query(self.size_param.as_str(), self.page_size);

        let response = self.client.execute(ctx, &spec).await?;
        let Page { items, total } = (self.extractor)(&response)?;

        self.pages_fetched += 1;
        self.total = Some(total);
        let seen = self.pages_fetched.saturating_mul(u64::from(self.page_size));
        self.has_more = seen < total && !items.is_empty();

        debug!(
            path = %self.path,
            page,
            items = items.len(),
            total,
            has_more = self.has_more,
            "fetched page"
        );

        Ok(items)
    }

    /// Fetch every remaining page, concatenating items in arrival order.
    ///
    /// Stops at the first error and returns it alongside the items gathered
    /// before it.
    pub async fn all(&mut self, ctx: &CallContext) -> Collected<T> {
        let mut items = Vec::new();

        while self.has_more_pages() {
            match self.next_page(ctx).await {
                Ok(page) => items.extend(page),
                Err(error) => {
                    return Collected {
                        items,
                        error: Some(error),
                    }
                }
            }
        }

        Collected { items, error: None }
    }
}
