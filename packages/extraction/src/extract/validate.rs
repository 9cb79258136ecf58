//! Candidate validation: sanity bounds applied before acceptance.
//!
//! Rejection is silent; a dropped candidate is not an error, it just never
//! reaches the caller.

use regex::Regex;
use std::sync::OnceLock;

use crate::types::{CandidateDraft, ExtractionMethod, ExtractorConfig, ProductCandidate};

/// Currency-formatted amount: symbol or code on either side of the number.
fn price_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(?:[$€£₹¥]|\b(?:Rs\.?|INR|USD|EUR|MRP))\s*:?\s*([0-9][0-9,]*(?:\.[0-9]{1,2})?)|([0-9][0-9,]*(?:\.[0-9]{1,2})?)\s*(?:[€₹]|(?:INR|USD|EUR)\b)",
        )
        .expect("static price regex")
    })
}

/// Bare duration strings that show up as delivery estimates ("10-15 mins").
fn duration_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^[0-9]+(?:\s*[-–]\s*[0-9]+)?\s*(?:mins?|minutes?|hrs?|hours?|days?)$")
            .expect("static duration regex")
    })
}

/// UI chrome that heuristic tiers routinely mistake for product names.
const NAME_DENYLIST: &[&str] = &[
    "add to cart",
    "add to basket",
    "buy now",
    "shop now",
    "view details",
    "view all",
    "see more",
    "load more",
    "show more",
    "quick view",
    "search results",
    "search result",
    "no results found",
    "sign in",
    "log in",
    "login",
    "register",
    "filter",
    "filters",
    "sort by",
    "next",
    "previous",
    "home",
    "menu",
    "notify me",
    "out of stock",
    "wishlist",
    "compare",
];

/// All currency-formatted amounts in a text span, in document order.
pub fn price_amounts(text: &str) -> Vec<f64> {
    price_regex()
        .captures_iter(text)
        .filter_map(|caps| {
            let raw = caps.get(1).or_else(|| caps.get(2))?.as_str();
            raw.replace(',', "").parse::<f64>().ok()
        })
        .collect()
}

/// Collapse runs of whitespace and trim.
pub fn clean_name(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Name sanity: length bounds, at least one letter, not UI chrome, not a
/// bare duration string.
pub fn valid_name(name: &str, config: &ExtractorConfig) -> bool {
    let len = name.chars().count();
    if len < config.min_name_len || len > config.max_name_len {
        return false;
    }
    if !name.chars().any(|c| c.is_alphabetic()) {
        return false;
    }
    let lowered = name.to_lowercase();
    if NAME_DENYLIST.contains(&lowered.as_str()) {
        return false;
    }
    if duration_regex().is_match(name.trim()) {
        return false;
    }
    true
}

/// Price within the plausible bound.
pub fn plausible_price(price: f64, config: &ExtractorConfig) -> bool {
    price.is_finite() && price >= config.min_price && price <= config.max_price
}

/// An original (strike-through) price is accepted only when it is strictly
/// greater than, and at most `max_original_price_ratio` times, the selling
/// price.
pub fn plausible_original_price(selling: f64, original: f64, config: &ExtractorConfig) -> bool {
    original > selling && original <= selling * config.max_original_price_ratio
}

/// Pick the original price out of further amounts found in the same context.
pub fn original_from_amounts(selling: f64, rest: &[f64], config: &ExtractorConfig) -> Option<f64> {
    rest.iter()
        .copied()
        .find(|&amount| plausible_original_price(selling, amount, config))
}

/// Validate a draft and promote it at a tier-fixed confidence.
pub fn promote(
    draft: CandidateDraft,
    method: ExtractionMethod,
    confidence: f32,
    config: &ExtractorConfig,
) -> Option<ProductCandidate> {
    build(draft, method, config).map(|c| ProductCandidate {
        confidence: confidence.clamp(0.0, 1.0),
        ..c
    })
}

/// Validate a draft and promote it at compositional heuristic confidence:
/// name and price each carry weight, image and detail URL add bonuses,
/// capped at 1.0.
pub fn promote_heuristic(
    draft: CandidateDraft,
    method: ExtractionMethod,
    config: &ExtractorConfig,
) -> Option<ProductCandidate> {
    let candidate = build(draft, method, config)?;

    let mut confidence = config.bonus_name + config.bonus_price;
    if candidate.image_url.is_some() {
        confidence += config.bonus_image;
    }
    if candidate.detail_url.is_some() {
        confidence += config.bonus_detail_url;
    }

    Some(ProductCandidate {
        confidence: confidence.clamp(0.0, 1.0),
        ..candidate
    })
}

/// Shared validation: a candidate needs a sane name and a plausible price;
/// everything else is optional and checked only when present.
fn build(
    draft: CandidateDraft,
    method: ExtractionMethod,
    config: &ExtractorConfig,
) -> Option<ProductCandidate> {
    let name = clean_name(draft.name.as_deref()?);
    if !valid_name(&name, config) {
        return None;
    }

    let price = draft.price?;
    if !plausible_price(price, config) {
        return None;
    }

    let original_price = draft
        .original_price
        .filter(|&original| plausible_original_price(price, original, config));

    let mut candidate = ProductCandidate::new(name, price, 0.0, method);
    candidate.original_price = original_price;
    candidate.image_url = draft.image_url;
    candidate.detail_url = draft.detail_url;
    Some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ExtractorConfig {
        ExtractorConfig::default()
    }

    #[test]
    fn parses_amounts_in_document_order() {
        let amounts = price_amounts("was ₹40.00 now ₹29, plus $1,299.50 shipping");
        assert_eq!(amounts, vec![40.0, 29.0, 1299.5]);
    }

    #[test]
    fn parses_suffix_currency() {
        assert_eq!(price_amounts("29 INR"), vec![29.0]);
        assert_eq!(price_amounts("12.50 €"), vec![12.5]);
    }

    #[test]
    fn ignores_bare_numbers() {
        assert!(price_amounts("500ml pack of 6").is_empty());
    }

    #[test]
    fn rejects_chrome_and_duration_names() {
        let cfg = config();
        assert!(!valid_name("Add to Cart", &cfg));
        assert!(!valid_name("Search Results", &cfg));
        assert!(!valid_name("10-15 mins", &cfg));
        assert!(!valid_name("30 minutes", &cfg));
        assert!(!valid_name("ab", &cfg));
        assert!(!valid_name("12345", &cfg));
        assert!(valid_name("Amul Toned Milk 500ml", &cfg));
    }

    #[test]
    fn price_bounds_are_enforced() {
        let cfg = config();
        assert!(!plausible_price(0.5, &cfg));
        assert!(!plausible_price(50_001.0, &cfg));
        assert!(plausible_price(1.0, &cfg));
        assert!(plausible_price(50_000.0, &cfg));
    }

    #[test]
    fn original_price_rule() {
        let cfg = config();
        // Strictly greater, within 3x.
        assert!(plausible_original_price(29.0, 40.0, &cfg));
        // Equal is not a discount.
        assert!(!plausible_original_price(29.0, 29.0, &cfg));
        // More than 3x is implausible.
        assert!(!plausible_original_price(29.0, 90.0, &cfg));
    }

    #[test]
    fn heuristic_confidence_is_compositional() {
        let cfg = config();

        let bare = CandidateDraft {
            name: Some("Amul Toned Milk".into()),
            price: Some(29.0),
            ..Default::default()
        };
        let c = promote_heuristic(bare, ExtractionMethod::RepeatedStructure, &cfg).unwrap();
        assert!((c.confidence - 0.6).abs() < 1e-6);

        let full = CandidateDraft {
            name: Some("Amul Toned Milk".into()),
            price: Some(29.0),
            original_price: Some(40.0),
            image_url: Some("https://cdn.example/milk.jpg".into()),
            detail_url: Some("https://shop.example/p/123".into()),
        };
        let c = promote_heuristic(full, ExtractionMethod::RepeatedStructure, &cfg).unwrap();
        assert!((c.confidence - 1.0).abs() < 1e-6);
        assert_eq!(c.original_price, Some(40.0));
    }

    #[test]
    fn implausible_original_price_is_dropped_silently() {
        let cfg = config();
        let draft = CandidateDraft {
            name: Some("Milk".into()),
            price: Some(29.0),
            original_price: Some(500.0),
            ..Default::default()
        };
        let c = promote(draft, ExtractionMethod::StructuredData, 0.95, &cfg).unwrap();
        assert_eq!(c.original_price, None);
        assert_eq!(c.price, 29.0);
    }
}
