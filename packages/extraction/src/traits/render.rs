//! Render collaborator: JavaScript execution for script-rendered sources.
//!
//! The rendering engine is heavyweight and stateful (cookies, location per
//! call), so it is modeled as a rate-limited external resource with its own
//! timeout, never as a cheap pure function.

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use crate::error::RenderResult;

type DefaultRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Render collaborator.
///
/// `Ok(None)` means the engine ran but captured nothing useful for the
/// page; it is treated as a tier failure upstream.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(
        &self,
        url: &str,
        locale: &str,
        wait_selector: Option<&str>,
        timeout: Duration,
    ) -> RenderResult<Option<String>>;
}

/// A renderer wrapper that enforces rate limits.
///
/// Uses the governor crate for precise rate limiting with burst support.
pub struct RateLimitedRenderer<R: Renderer> {
    inner: R,
    limiter: Arc<DefaultRateLimiter>,
}

impl<R: Renderer> RateLimitedRenderer<R> {
    /// Create a new rate-limited renderer.
    pub fn new(renderer: R, renders_per_second: u32) -> Self {
        let quota = Quota::per_second(
            NonZeroU32::new(renders_per_second).expect("renders_per_second must be > 0"),
        );
        Self {
            inner: renderer,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Create with burst support.
    pub fn with_burst(renderer: R, renders_per_second: u32, burst: u32) -> Self {
        let quota = Quota::per_second(
            NonZeroU32::new(renders_per_second).expect("renders_per_second must be > 0"),
        )
        .allow_burst(NonZeroU32::new(burst).expect("burst must be > 0"));

        Self {
            inner: renderer,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }
}

#[async_trait]
impl<R: Renderer> Renderer for RateLimitedRenderer<R> {
    async fn render(
        &self,
        url: &str,
        locale: &str,
        wait_selector: Option<&str>,
        timeout: Duration,
    ) -> RenderResult<Option<String>> {
        self.limiter.until_ready().await;
        self.inner.render(url, locale, wait_selector, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    struct InstantRenderer;

    #[async_trait]
    impl Renderer for InstantRenderer {
        async fn render(
            &self,
            _url: &str,
            _locale: &str,
            _wait_selector: Option<&str>,
            _timeout: Duration,
        ) -> RenderResult<Option<String>> {
            Ok(Some("<html></html>".to_string()))
        }
    }

    #[tokio::test]
    async fn rate_limits_renders() {
        let renderer = RateLimitedRenderer::new(InstantRenderer, 2);

        let start = Instant::now();
        for _ in 0..3 {
            renderer
                .render("https://example.com", "en", None, Duration::from_secs(1))
                .await
                .unwrap();
        }
        let elapsed = start.elapsed();

        // First render is immediate, the third must wait at the 2/sec quota.
        assert!(elapsed.as_millis() >= 500, "rate limiting not working: {elapsed:?}");
    }
}
