//! Extraction candidates: one product found in markup.

use serde::{Deserialize, Serialize};

/// How a candidate was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Replay of a previously learned per-source selector
    LearnedSelector,
    /// Schema.org / social-preview markup the page itself labeled as product data
    StructuredData,
    /// Inline application-state or hydration payload
    EmbeddedState,
    /// Sibling-group heuristic over the DOM
    RepeatedStructure,
    /// Smallest container holding both a product image and a price
    PriceImageProximity,
    /// Anchor matching a product-detail URL shape
    DetailLinkPattern,
    /// Items returned directly by a source's native API
    NativeApi,
    /// Remote AI escalation over retained markup
    AiEscalated,
}

/// One product found in markup. Immutable value; the caller owns it once
/// returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductCandidate {
    pub name: String,

    /// Selling price, in source currency units
    pub price: f64,

    /// Strike-through price, when present and plausible
    pub original_price: Option<f64>,

    pub image_url: Option<String>,
    pub detail_url: Option<String>,

    /// Confidence that this is genuine product data, clamped to [0, 1]
    pub confidence: f32,

    pub method: ExtractionMethod,
}

impl ProductCandidate {
    /// Create a candidate, clamping confidence into [0, 1].
    pub fn new(
        name: impl Into<String>,
        price: f64,
        confidence: f32,
        method: ExtractionMethod,
    ) -> Self {
        Self {
            name: name.into(),
            price,
            original_price: None,
            image_url: None,
            detail_url: None,
            confidence: confidence.clamp(0.0, 1.0),
            method,
        }
    }

    pub fn with_original_price(mut self, price: f64) -> Self {
        self.original_price = Some(price);
        self
    }

    pub fn with_image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    pub fn with_detail_url(mut self, url: impl Into<String>) -> Self {
        self.detail_url = Some(url.into());
        self
    }

    /// Name key used for de-duplication across tiers.
    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }

    /// Discount against the original price, as a whole percentage.
    pub fn discount_percent(&self) -> Option<u8> {
        let original = self.original_price?;
        if original <= self.price {
            return None;
        }
        Some((((original - self.price) / original) * 100.0).round() as u8)
    }
}

/// Lowercase, whitespace-collapsed form of a product name.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Partially assembled candidate, produced by an extraction tier before
/// validation and confidence scoring.
#[derive(Debug, Clone, Default)]
pub struct CandidateDraft {
    pub name: Option<String>,
    pub price: Option<f64>,
    pub original_price: Option<f64>,
    pub image_url: Option<String>,
    pub detail_url: Option<String>,
}

impl CandidateDraft {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.price.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_is_clamped() {
        let c = ProductCandidate::new("Milk", 29.0, 1.4, ExtractionMethod::StructuredData);
        assert_eq!(c.confidence, 1.0);

        let c = ProductCandidate::new("Milk", 29.0, -0.2, ExtractionMethod::StructuredData);
        assert_eq!(c.confidence, 0.0);
    }

    #[test]
    fn normalized_name_collapses_case_and_whitespace() {
        let c = ProductCandidate::new("  Amul  Toned   Milk ", 29.0, 0.9, ExtractionMethod::StructuredData);
        assert_eq!(c.normalized_name(), "amul toned milk");
    }

    #[test]
    fn discount_requires_higher_original() {
        let c = ProductCandidate::new("Milk", 80.0, 0.9, ExtractionMethod::StructuredData)
            .with_original_price(100.0);
        assert_eq!(c.discount_percent(), Some(20));

        let no_discount =
            ProductCandidate::new("Milk", 100.0, 0.9, ExtractionMethod::StructuredData)
                .with_original_price(100.0);
        assert_eq!(no_discount.discount_percent(), None);
    }
}
