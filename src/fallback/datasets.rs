//! Dataset Convenience Wrappers
//!
//! Pre-bind endpoint, fallback key and locale for the logical datasets the
//! platform fetches most, so call sites stay one-liners.

use std::sync::Arc;

use crate::fallback::manager::{ApiFallbackManager, ApiResponse, RequestOptions};
use crate::models::{Loft, Testimonial};

/// Typed client for the platform's public datasets.
#[derive(Clone)]
pub struct DatasetClient {
    manager: Arc<ApiFallbackManager>,
    base_url: String,
}

impl DatasetClient {
    /// Creates a client rooted at `base_url` (no trailing slash).
    pub fn new(manager: Arc<ApiFallbackManager>, base_url: impl Into<String>) -> Self {
        Self {
            manager,
            base_url: base_url.into(),
        }
    }

    fn locale_query(locale: &str) -> RequestOptions {
        RequestOptions {
            query: vec![("locale".to_string(), locale.to_string())],
            ..RequestOptions::default()
        }
    }

    // == Lofts ==
    /// Fetches the loft listings for a locale, degrading through the
    /// fallback chain under the `"lofts"` snapshot key.
    pub async fn fetch_lofts(&self, locale: &str) -> ApiResponse<Vec<Loft>> {
        self.manager
            .fetch_with_fallback(
                &format!("{}/api/lofts", self.base_url),
                Self::locale_query(locale),
                Some("lofts"),
                Some(locale),
            )
            .await
    }

    // == Testimonials ==
    /// Fetches guest testimonials for a locale under the `"testimonials"`
    /// snapshot key.
    pub async fn fetch_testimonials(&self, locale: &str) -> ApiResponse<Vec<Testimonial>> {
        self.manager
            .fetch_with_fallback(
                &format!("{}/api/testimonials", self.base_url),
                Self::locale_query(locale),
                Some("testimonials"),
                Some(locale),
            )
            .await
    }
}
