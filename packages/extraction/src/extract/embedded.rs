//! Embedded-state extraction: hydration payloads inlined into scripts.
//!
//! Script-rendered storefronts ship their product data twice: once in the
//! DOM the scripts build, and once in the JSON state blob the scripts
//! build it from. The blob survives markup redesigns far better than the
//! DOM does, so it is worth scanning structurally for `name` + `price`
//! shaped key pairs.

use scraper::{Html, Selector};
use serde_json::Value;
use std::sync::OnceLock;

use super::structured::loose_number;
use super::validate;
use super::{resolve_url, ExtractionHints};
use crate::types::{CandidateDraft, ExtractionMethod, ExtractorConfig, ProductCandidate};

const MAX_WALK_DEPTH: usize = 12;

/// Key shapes for each candidate field, checked in order.
const NAME_KEYS: &[&str] = &["name", "title", "productName", "product_name", "displayName", "display_name"];
const PRICE_KEYS: &[&str] = &["price", "sellingPrice", "selling_price", "salePrice", "sale_price", "offerPrice", "offer_price", "currentPrice", "current_price"];
const ORIGINAL_KEYS: &[&str] = &["mrp", "originalPrice", "original_price", "listPrice", "list_price", "strikePrice", "strike_price", "wasPrice", "was_price"];
const IMAGE_KEYS: &[&str] = &["image", "imageUrl", "image_url", "img", "thumbnail", "thumbnailUrl"];
const URL_KEYS: &[&str] = &["url", "link", "productUrl", "product_url", "href"];

fn scripts() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    SELECTOR.get_or_init(|| Selector::parse("script").expect("static selector"))
}

/// Scan every inline script for JSON payloads holding product-shaped
/// objects.
pub(crate) fn extract(
    document: &Html,
    hints: &ExtractionHints,
    config: &ExtractorConfig,
) -> Vec<ProductCandidate> {
    let mut drafts = Vec::new();

    for script in document.select(scripts()) {
        if script.value().attr("src").is_some() {
            continue;
        }
        if script.value().attr("type").is_some_and(|t| t.contains("ld+json")) {
            // JSON-LD belongs to the structured tier.
            continue;
        }

        let text: String = script.text().collect();
        for payload in json_payloads(&text) {
            walk(&payload, 0, hints, &mut drafts);
        }
    }

    drafts
        .into_iter()
        .filter_map(|draft| {
            validate::promote(
                draft,
                ExtractionMethod::EmbeddedState,
                config.embedded_confidence,
                config,
            )
        })
        .collect()
}

/// Extract parseable JSON objects/arrays from a script body.
///
/// Hydration blobs sit behind arbitrary prefixes (`window.__STATE__ =`,
/// `self.push(...)`), so the scanner finds balanced brace spans rather
/// than trusting the whole body to parse.
fn json_payloads(script: &str) -> Vec<Value> {
    let mut payloads = Vec::new();
    let bytes = script.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'{' || bytes[i] == b'[' {
            if let Some(end) = balanced_span(bytes, i) {
                if let Ok(value) = serde_json::from_str::<Value>(&script[i..=end]) {
                    payloads.push(value);
                    i = end + 1;
                    continue;
                }
            }
        }
        i += 1;
    }

    payloads
}

/// End index of the balanced bracket span starting at `start`, honoring
/// string literals and escapes.
fn balanced_span(bytes: &[u8], start: usize) -> Option<usize> {
    let open = bytes[start];
    let close = if open == b'{' { b'}' } else { b']' };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            _ if b == open => depth += 1,
            _ if b == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }

    None
}

fn walk(value: &Value, depth: usize, hints: &ExtractionHints, out: &mut Vec<CandidateDraft>) {
    if depth > MAX_WALK_DEPTH {
        return;
    }

    match value {
        Value::Array(items) => {
            for item in items {
                walk(item, depth + 1, hints, out);
            }
        }
        Value::Object(map) => {
            if let Some(draft) = product_shaped(map, hints) {
                out.push(draft);
            }
            for nested in map.values() {
                walk(nested, depth + 1, hints, out);
            }
        }
        _ => {}
    }
}

/// An object is product-shaped when it carries both a name-shaped string
/// and a price-shaped number.
fn product_shaped(
    map: &serde_json::Map<String, Value>,
    hints: &ExtractionHints,
) -> Option<CandidateDraft> {
    let name = first_key(map, NAME_KEYS)?.as_str()?.to_string();
    let price = first_key(map, PRICE_KEYS).and_then(loose_number)?;

    let original_price = first_key(map, ORIGINAL_KEYS).and_then(loose_number);
    let image_url = first_key(map, IMAGE_KEYS)
        .and_then(Value::as_str)
        .map(|u| resolve_url(hints, u));
    let detail_url = first_key(map, URL_KEYS)
        .and_then(Value::as_str)
        .filter(|u| !u.is_empty())
        .map(|u| resolve_url(hints, u));

    Some(CandidateDraft {
        name: Some(name),
        price: Some(price),
        original_price,
        image_url,
        detail_url,
    })
}

fn first_key<'a>(map: &'a serde_json::Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| map.get(*k))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract_all(markup: &str) -> Vec<ProductCandidate> {
        let document = Html::parse_document(markup);
        extract(
            &document,
            &ExtractionHints::default(),
            &ExtractorConfig::default(),
        )
    }

    #[test]
    fn finds_products_in_hydration_blob() {
        let markup = r#"<script>
        window.__INITIAL_STATE__ = {"search":{"results":[
            {"productName":"Amul Toned Milk 500ml","sellingPrice":29,"mrp":33,
             "imageUrl":"https://cdn.example/milk.jpg"},
            {"productName":"Amul Butter 100g","sellingPrice":60}
        ]}};
        </script>"#;

        let candidates = extract_all(markup);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].name, "Amul Toned Milk 500ml");
        assert_eq!(candidates[0].price, 29.0);
        assert_eq!(candidates[0].original_price, Some(33.0));
        assert!((candidates[0].confidence - 0.85).abs() < 1e-6);
        assert_eq!(candidates[1].original_price, None);
    }

    #[test]
    fn implausible_original_price_is_stripped() {
        let markup = r#"<script>var s = {"name":"Milk","price":29,"mrp":2900};</script>"#;
        let candidates = extract_all(markup);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].original_price, None);
    }

    #[test]
    fn skips_non_product_state() {
        let markup = r#"<script>
        window.cfg = {"user":{"name":"session"},"flags":{"checkout":true}};
        </script>"#;
        // "name" without any price-shaped sibling is not a product.
        assert!(extract_all(markup).is_empty());
    }

    #[test]
    fn survives_hostile_script_bodies() {
        let markup = r#"<script>
        if (a < b) { doThing("{unbalanced") } // stray braces
        var x = {"name":"Greek Yogurt 400g","price":"₹95","url":"/p/yogurt"};
        </script>"#;

        let candidates = extract_all(markup);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].price, 95.0);
    }

    #[test]
    fn ld_json_scripts_are_left_to_the_structured_tier() {
        let markup = r#"<script type="application/ld+json">
        {"@type":"Product","name":"Milk","offers":{"price":29}}</script>"#;
        assert!(extract_all(markup).is_empty());
    }
}
