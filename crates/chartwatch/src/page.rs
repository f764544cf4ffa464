//! Page content provider abstraction.
//!
//! Defines the `PageContentProvider` trait that abstracts over the browser
//! session holding the rendered chart page (Chromium in the daemon, an
//! in-memory page in tests).

use async_trait::async_trait;

use crate::types::TrackerResult;

/// Opaque handle to an element found on the current page.
///
/// Handles are only valid until the next document-level [`find_all`] call.
///
/// [`find_all`]: PageContentProvider::find_all
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(usize);

impl ElementHandle {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

/// A rendered page that can be navigated, scripted and queried by selector.
///
/// Failures of the underlying driver surface as `TrackerError::PageLoad`.
#[async_trait]
pub trait PageContentProvider: Send {
    /// Navigate to a URL and wait for the page to load.
    async fn navigate(&mut self, url: &str) -> TrackerResult<()>;
    /// Evaluate JavaScript in the page and return its value (`Null` for `undefined`).
    async fn evaluate(&mut self, script: &str) -> TrackerResult<serde_json::Value>;
    /// Find every element matching `selector` in the whole document.
    ///
    /// Invalidates handles returned by earlier calls.
    async fn find_all(&mut self, selector: &str) -> TrackerResult<Vec<ElementHandle>>;
    /// Find the first descendant of `parent` matching `selector`.
    async fn find_within(
        &mut self,
        parent: ElementHandle,
        selector: &str,
    ) -> TrackerResult<Option<ElementHandle>>;
    /// Read an attribute of an element.
    async fn attribute(&mut self, element: ElementHandle, name: &str)
        -> TrackerResult<Option<String>>;
    /// Read the inner markup of an element.
    async fn inner_html(&mut self, element: ElementHandle) -> TrackerResult<String>;
    /// Read the rendered text of an element.
    async fn text(&mut self, element: ElementHandle) -> TrackerResult<String>;
    /// Release the session.
    async fn close(&mut self) -> TrackerResult<()>;
}
