//! In-memory page content provider for tests.
//!
//! `FakePage` holds a small element tree in which an element matches a selector
//! when that exact selector string was attached to it. Scroll height reads come
//! from a scripted sequence, so readiness behavior can be replayed
//! deterministically.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use serde_json::Value;

use crate::fields::Selectors;
use crate::page::{ElementHandle, PageContentProvider};
use crate::readiness::SCROLL_HEIGHT_JS;
use crate::types::{TrackerError, TrackerResult};

/// A fake DOM element.
#[derive(Debug, Clone, Default)]
pub struct FakeElement {
    selectors: Vec<String>,
    attributes: HashMap<String, String>,
    inner_html: String,
    children: Vec<FakeElement>,
}

impl FakeElement {
    /// An element matched by `selector`.
    pub fn new(selector: &str) -> Self {
        Self {
            selectors: vec![selector.to_string()],
            ..Self::default()
        }
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn inner_html(mut self, html: &str) -> Self {
        self.inner_html = html.to_string();
        self
    }

    pub fn child(mut self, child: FakeElement) -> Self {
        self.children.push(child);
        self
    }
}

/// Build one chart item the way the storefront lays it out.
pub fn storefront_item(
    selectors: &Selectors,
    name_html: &str,
    href: &str,
    price_html: &str,
    image_src: &str,
) -> FakeElement {
    FakeElement::new(&selectors.item)
        .child(FakeElement::new(&selectors.name).inner_html(name_html))
        .child(FakeElement::new(&selectors.url).attr("href", href))
        .child(
            FakeElement::new(&selectors.price_parent)
                .child(FakeElement::new(&selectors.price_text).inner_html(price_html)),
        )
        .child(
            FakeElement::new(&selectors.image_parent)
                .child(FakeElement::new(&selectors.image).attr("src", image_src)),
        )
}

#[derive(Debug)]
struct Node {
    selectors: Vec<String>,
    attributes: HashMap<String, String>,
    inner_html: String,
    children: Vec<usize>,
}

/// Scripted in-memory page.
#[derive(Debug, Default)]
pub struct FakePage {
    nodes: Vec<Node>,
    roots: Vec<usize>,
    heights: VecDeque<u64>,
    last_height: u64,
    /// URLs passed to `navigate`, in order.
    pub navigations: Vec<String>,
    /// Number of scroll-to-bottom scripts evaluated.
    pub scrolls: u32,
    /// Number of height reads served.
    pub height_reads: u32,
    /// Set when `close` has been called.
    pub closed: bool,
    fail_navigation: bool,
}

impl FakePage {
    pub fn new(elements: Vec<FakeElement>) -> Self {
        let mut page = Self::default();
        page.set_elements(elements);
        page
    }

    /// Script the values returned by successive height reads.
    ///
    /// Once the script runs out, the last value repeats.
    pub fn with_heights(mut self, heights: impl IntoIterator<Item = u64>) -> Self {
        self.heights = heights.into_iter().collect();
        self
    }

    /// Make every navigation fail.
    pub fn failing_navigation(mut self) -> Self {
        self.fail_navigation = true;
        self
    }

    /// Replace the document, as a re-render would.
    pub fn set_elements(&mut self, elements: Vec<FakeElement>) {
        self.nodes.clear();
        let roots = elements.into_iter().map(|el| self.insert(el)).collect();
        self.roots = roots;
    }

    fn insert(&mut self, element: FakeElement) -> usize {
        let children = element
            .children
            .into_iter()
            .map(|child| self.insert(child))
            .collect();
        self.nodes.push(Node {
            selectors: element.selectors,
            attributes: element.attributes,
            inner_html: element.inner_html,
            children,
        });
        self.nodes.len() - 1
    }

    fn node(&self, handle: ElementHandle) -> TrackerResult<&Node> {
        self.nodes
            .get(handle.index())
            .ok_or_else(|| TrackerError::PageLoad(format!("stale element handle {handle:?}")))
    }

    /// Pre-order walk, so matches come out in document order.
    fn collect_matches(&self, index: usize, selector: &str, out: &mut Vec<usize>) {
        let node = &self.nodes[index];
        if node.selectors.iter().any(|s| s == selector) {
            out.push(index);
        }
        for &child in &node.children {
            self.collect_matches(child, selector, out);
        }
    }

    fn next_height(&mut self) -> u64 {
        if let Some(height) = self.heights.pop_front() {
            self.last_height = height;
        }
        self.height_reads += 1;
        self.last_height
    }
}

#[async_trait]
impl PageContentProvider for FakePage {
    async fn navigate(&mut self, url: &str) -> TrackerResult<()> {
        if self.fail_navigation {
            return Err(TrackerError::PageLoad(format!("navigation to {url} failed")));
        }
        self.navigations.push(url.to_string());
        Ok(())
    }

    async fn evaluate(&mut self, script: &str) -> TrackerResult<Value> {
        if script == SCROLL_HEIGHT_JS {
            return Ok(Value::from(self.next_height()));
        }
        self.scrolls += 1;
        Ok(Value::Null)
    }

    async fn find_all(&mut self, selector: &str) -> TrackerResult<Vec<ElementHandle>> {
        let mut matches = Vec::new();
        for &root in &self.roots {
            self.collect_matches(root, selector, &mut matches);
        }
        Ok(matches.into_iter().map(ElementHandle::new).collect())
    }

    async fn find_within(
        &mut self,
        parent: ElementHandle,
        selector: &str,
    ) -> TrackerResult<Option<ElementHandle>> {
        let node = self.node(parent)?;
        let mut matches = Vec::new();
        for &child in &node.children {
            self.collect_matches(child, selector, &mut matches);
            if !matches.is_empty() {
                break;
            }
        }
        Ok(matches.first().copied().map(ElementHandle::new))
    }

    async fn attribute(
        &mut self,
        element: ElementHandle,
        name: &str,
    ) -> TrackerResult<Option<String>> {
        Ok(self.node(element)?.attributes.get(name).cloned())
    }

    async fn inner_html(&mut self, element: ElementHandle) -> TrackerResult<String> {
        Ok(self.node(element)?.inner_html.clone())
    }

    async fn text(&mut self, element: ElementHandle) -> TrackerResult<String> {
        Ok(self.node(element)?.inner_html.clone())
    }

    async fn close(&mut self) -> TrackerResult<()> {
        self.closed = true;
        Ok(())
    }
}
