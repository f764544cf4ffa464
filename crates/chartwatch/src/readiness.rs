//! Scroll-to-completion for lazily loaded chart pages.
//!
//! The chart renders more items (and loads their icons) as the viewport nears
//! the bottom. The page is ready once scrolling no longer grows the document.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::page::PageContentProvider;
use crate::types::{TrackerError, TrackerResult};

/// Script returning the document's total content height.
pub const SCROLL_HEIGHT_JS: &str = "document.body.scrollHeight";

/// Script scrolling the viewport to the bottom of the document.
pub const SCROLL_TO_BOTTOM_JS: &str = "window.scrollTo(0, document.body.scrollHeight)";

/// Bounds for the convergence loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// Wait between scrolling and re-reading the height.
    pub poll_interval: Duration,
    pub max_iterations: u32,
    pub max_wait: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_iterations: 120,
            max_wait: Duration::from_secs(300),
        }
    }
}

/// Scroll until two consecutive height readings are equal.
///
/// Returns the number of scroll iterations performed, or
/// `TrackerError::PageNotReady` when the policy bounds run out first.
pub async fn scroll_to_completion<P>(page: &mut P, policy: &ReadinessPolicy) -> TrackerResult<u32>
where
    P: PageContentProvider + ?Sized,
{
    let started = Instant::now();
    let mut current = read_height(page).await?;
    let mut iterations = 0u32;

    loop {
        if iterations >= policy.max_iterations || started.elapsed() >= policy.max_wait {
            return Err(TrackerError::PageNotReady {
                iterations,
                elapsed_ms: started.elapsed().as_millis() as u64,
            });
        }

        let last = current;
        page.evaluate(SCROLL_TO_BOTTOM_JS).await?;
        iterations += 1;
        tokio::time::sleep(policy.poll_interval).await;
        current = read_height(page).await?;
        debug!(iteration = iterations, last, current, "scrolled to bottom");

        if current == last {
            return Ok(iterations);
        }
    }
}

async fn read_height<P>(page: &mut P) -> TrackerResult<u64>
where
    P: PageContentProvider + ?Sized,
{
    let value = page.evaluate(SCROLL_HEIGHT_JS).await?;
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|h| *h >= 0.0).map(|h| h as u64))
        .ok_or_else(|| TrackerError::PageLoad(format!("scroll height is not a number: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakePage;

    fn instant_policy(max_iterations: u32) -> ReadinessPolicy {
        ReadinessPolicy {
            poll_interval: Duration::ZERO,
            max_iterations,
            max_wait: Duration::from_secs(60),
        }
    }

    #[tokio::test]
    async fn test_converges_on_repeated_height() {
        let mut page = FakePage::new(Vec::new()).with_heights([100, 200, 200]);
        let iterations = scroll_to_completion(&mut page, &instant_policy(10))
            .await
            .unwrap();

        assert_eq!(iterations, 2);
        assert_eq!(page.height_reads, 3);
        assert_eq!(page.scrolls, 2);
    }

    #[tokio::test]
    async fn test_static_page_needs_one_scroll() {
        let mut page = FakePage::new(Vec::new()).with_heights([640]);
        let iterations = scroll_to_completion(&mut page, &instant_policy(10))
            .await
            .unwrap();
        assert_eq!(iterations, 1);
    }

    #[tokio::test]
    async fn test_endless_growth_hits_iteration_bound() {
        let mut page = FakePage::new(Vec::new()).with_heights((1..=50).map(|i| i * 100));
        let err = scroll_to_completion(&mut page, &instant_policy(3))
            .await
            .unwrap_err();

        match err {
            TrackerError::PageNotReady { iterations, .. } => assert_eq!(iterations, 3),
            other => panic!("expected PageNotReady, got {other:?}"),
        }
        assert_eq!(page.scrolls, 3);
    }

    #[tokio::test]
    async fn test_wall_clock_bound() {
        let mut page = FakePage::new(Vec::new()).with_heights((1..=50).map(|i| i * 100));
        let policy = ReadinessPolicy {
            poll_interval: Duration::ZERO,
            max_iterations: 1_000,
            max_wait: Duration::ZERO,
        };
        let err = scroll_to_completion(&mut page, &policy).await.unwrap_err();
        assert!(matches!(
            err,
            TrackerError::PageNotReady { iterations: 0, .. }
        ));
    }
}
