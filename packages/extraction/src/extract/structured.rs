//! Structured-data extraction: product markup the page itself labels.
//!
//! Three carriers, all explicit product semantics: JSON-LD
//! `Product`/`ItemList` blocks, microdata `itemscope`/`itemprop`
//! annotations, and social-preview (`og:`/`product:`) meta tags.

use scraper::{Html, Selector};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;

use super::validate;
use super::{resolve_url, ExtractionHints};
use crate::types::{CandidateDraft, ExtractionMethod, ExtractorConfig, ProductCandidate};

const MAX_JSON_DEPTH: usize = 8;

struct Selectors {
    ld_json: Selector,
    itemscope: Selector,
    itemprop_name: Selector,
    itemprop_price: Selector,
    itemprop_image: Selector,
    itemprop_url: Selector,
    meta: Selector,
}

fn selectors() -> &'static Selectors {
    static SELECTORS: OnceLock<Selectors> = OnceLock::new();
    SELECTORS.get_or_init(|| Selectors {
        ld_json: Selector::parse(r#"script[type="application/ld+json"]"#).expect("static selector"),
        itemscope: Selector::parse("[itemscope][itemtype]").expect("static selector"),
        itemprop_name: Selector::parse(r#"[itemprop="name"]"#).expect("static selector"),
        itemprop_price: Selector::parse(r#"[itemprop="price"]"#).expect("static selector"),
        itemprop_image: Selector::parse(r#"[itemprop="image"]"#).expect("static selector"),
        itemprop_url: Selector::parse(r#"[itemprop="url"]"#).expect("static selector"),
        meta: Selector::parse("meta[property]").expect("static selector"),
    })
}

/// Run all three carriers over a parsed document.
pub(crate) fn extract(
    document: &Html,
    hints: &ExtractionHints,
    config: &ExtractorConfig,
) -> Vec<ProductCandidate> {
    let mut drafts = Vec::new();

    json_ld_drafts(document, hints, &mut drafts);
    microdata_drafts(document, hints, &mut drafts);
    if let Some(draft) = open_graph_draft(document, hints) {
        drafts.push(draft);
    }

    drafts
        .into_iter()
        .filter_map(|draft| {
            validate::promote(
                draft,
                ExtractionMethod::StructuredData,
                config.structured_confidence,
                config,
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// JSON-LD
// ---------------------------------------------------------------------------

fn json_ld_drafts(document: &Html, hints: &ExtractionHints, out: &mut Vec<CandidateDraft>) {
    for script in document.select(&selectors().ld_json) {
        let raw: String = script.text().collect();
        let Ok(value) = serde_json::from_str::<Value>(raw.trim()) else {
            tracing::debug!("unparsable JSON-LD block skipped");
            continue;
        };
        collect_products(&value, 0, hints, out);
    }
}

fn collect_products(
    value: &Value,
    depth: usize,
    hints: &ExtractionHints,
    out: &mut Vec<CandidateDraft>,
) {
    if depth > MAX_JSON_DEPTH {
        return;
    }

    match value {
        Value::Array(items) => {
            for item in items {
                collect_products(item, depth + 1, hints, out);
            }
        }
        Value::Object(map) => {
            if is_product_type(map.get("@type")) {
                if let Some(draft) = product_draft(map, hints) {
                    out.push(draft);
                }
            }
            // ItemList, @graph, mainEntity, nested offers all live below.
            for nested in map.values() {
                collect_products(nested, depth + 1, hints, out);
            }
        }
        _ => {}
    }
}

fn is_product_type(type_field: Option<&Value>) -> bool {
    match type_field {
        Some(Value::String(s)) => s == "Product",
        Some(Value::Array(items)) => items.iter().any(|v| v.as_str() == Some("Product")),
        _ => false,
    }
}

fn product_draft(
    map: &serde_json::Map<String, Value>,
    hints: &ExtractionHints,
) -> Option<CandidateDraft> {
    let name = map.get("name").and_then(Value::as_str)?.to_string();

    let offers = map.get("offers");
    let price = offers.and_then(offer_price)?;

    let image_url = map
        .get("image")
        .and_then(image_field)
        .map(|u| resolve_url(hints, &u));
    let detail_url = map
        .get("url")
        .and_then(Value::as_str)
        .map(|u| resolve_url(hints, u));

    Some(CandidateDraft {
        name: Some(name),
        price: Some(price),
        original_price: None,
        image_url,
        detail_url,
    })
}

fn offer_price(offers: &Value) -> Option<f64> {
    match offers {
        Value::Object(map) => map
            .get("price")
            .or_else(|| map.get("lowPrice"))
            .and_then(loose_number),
        Value::Array(items) => items.iter().find_map(offer_price),
        _ => None,
    }
}

fn image_field(image: &Value) -> Option<String> {
    match image {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(image_field),
        Value::Object(map) => map.get("url").and_then(Value::as_str).map(String::from),
        _ => None,
    }
}

/// Numbers arrive as JSON numbers, plain numeric strings, or
/// currency-formatted strings; accept all three.
pub(crate) fn loose_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed
                .replace(',', "")
                .parse::<f64>()
                .ok()
                .or_else(|| validate::price_amounts(trimmed).first().copied())
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Microdata
// ---------------------------------------------------------------------------

fn microdata_drafts(document: &Html, hints: &ExtractionHints, out: &mut Vec<CandidateDraft>) {
    let sels = selectors();

    for scope in document.select(&sels.itemscope) {
        let itemtype = scope.value().attr("itemtype").unwrap_or("");
        if !itemtype.contains("Product") {
            continue;
        }

        let name = scope
            .select(&sels.itemprop_name)
            .next()
            .map(|el| el.text().collect::<String>());

        let price = scope.select(&sels.itemprop_price).next().and_then(|el| {
            el.value()
                .attr("content")
                .and_then(|c| c.replace(',', "").trim().parse::<f64>().ok())
                .or_else(|| {
                    validate::price_amounts(&el.text().collect::<String>())
                        .first()
                        .copied()
                })
        });

        let image_url = scope.select(&sels.itemprop_image).next().and_then(|el| {
            el.value()
                .attr("src")
                .or_else(|| el.value().attr("content"))
                .map(|u| resolve_url(hints, u))
        });

        let detail_url = scope
            .select(&sels.itemprop_url)
            .next()
            .and_then(|el| el.value().attr("href").or_else(|| el.value().attr("content")))
            .map(|u| resolve_url(hints, u));

        out.push(CandidateDraft {
            name,
            price,
            original_price: None,
            image_url,
            detail_url,
        });
    }
}

// ---------------------------------------------------------------------------
// Social-preview meta tags
// ---------------------------------------------------------------------------

fn open_graph_draft(document: &Html, hints: &ExtractionHints) -> Option<CandidateDraft> {
    let mut props: HashMap<&str, &str> = HashMap::new();
    for meta in document.select(&selectors().meta) {
        let value = meta.value();
        if let (Some(property), Some(content)) = (value.attr("property"), value.attr("content")) {
            props.entry(property).or_insert(content);
        }
    }

    let og_type = props.get("og:type")?;
    if !og_type.starts_with("product") {
        return None;
    }

    let price = props
        .get("product:price:amount")
        .or_else(|| props.get("og:price:amount"))
        .and_then(|raw| raw.replace(',', "").trim().parse::<f64>().ok());

    Some(CandidateDraft {
        name: props.get("og:title").map(|s| s.to_string()),
        price,
        original_price: None,
        image_url: props.get("og:image").map(|u| resolve_url(hints, u)),
        detail_url: props.get("og:url").map(|u| resolve_url(hints, u)),
    })
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
    fn json_ld_product_block() {
        let markup = r#"<html><head><script type="application/ld+json">
        {"@context":"https://schema.org","@type":"Product",
         "name":"Amul Toned Milk 500ml",
         "image":"https://cdn.example/milk.jpg",
         "offers":{"@type":"Offer","price":"29","priceCurrency":"INR"}}
        </script></head><body></body></html>"#;

        let candidates = extract_all(markup);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name, "Amul Toned Milk 500ml");
        assert_eq!(candidates[0].price, 29.0);
        assert!(candidates[0].confidence >= 0.9);
        assert_eq!(candidates[0].method, ExtractionMethod::StructuredData);
    }

    #[test]
    fn json_ld_item_list() {
        let markup = r#"<script type="application/ld+json">
        {"@type":"ItemList","itemListElement":[
          {"@type":"ListItem","item":{"@type":"Product","name":"Basmati Rice 1kg",
            "offers":{"price":120}}},
          {"@type":"ListItem","item":{"@type":"Product","name":"Sunflower Oil 1L",
            "offers":[{"price":"189.50"}]}}
        ]}</script>"#;

        let candidates = extract_all(markup);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].name, "Basmati Rice 1kg");
        assert_eq!(candidates[1].price, 189.5);
    }

    #[test]
    fn microdata_product() {
        let markup = r#"<div itemscope itemtype="https://schema.org/Product">
            <a itemprop="url" href="/p/99"><span itemprop="name">Organic Eggs (6)</span></a>
            <img itemprop="image" src="/img/eggs.jpg">
            <span itemprop="price" content="84.00">₹84</span>
        </div>"#;

        let document = Html::parse_document(markup);
        let hints = ExtractionHints {
            base_url: Some("https://shop.example".to_string()),
            ..Default::default()
        };
        let candidates = extract(&document, &hints, &ExtractorConfig::default());

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name, "Organic Eggs (6)");
        assert_eq!(candidates[0].price, 84.0);
        assert_eq!(
            candidates[0].detail_url.as_deref(),
            Some("https://shop.example/p/99")
        );
        assert_eq!(
            candidates[0].image_url.as_deref(),
            Some("https://shop.example/img/eggs.jpg")
        );
    }

    #[test]
    fn open_graph_product_page() {
        let markup = r#"<head>
            <meta property="og:type" content="product">
            <meta property="og:title" content="Peanut Butter 340g">
            <meta property="product:price:amount" content="249">
            <meta property="og:image" content="https://cdn.example/pb.jpg">
        </head>"#;

        let candidates = extract_all(markup);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name, "Peanut Butter 340g");
        assert_eq!(candidates[0].price, 249.0);
    }

    #[test]
    fn non_product_markup_yields_nothing() {
        let markup = r#"<script type="application/ld+json">
        {"@type":"Article","name":"How to choose milk","author":"x"}</script>
        <head><meta property="og:type" content="article"></head>"#;
        assert!(extract_all(markup).is_empty());
    }

    #[test]
    fn malformed_json_ld_is_skipped() {
        let markup = r#"<script type="application/ld+json">{not json"#;
        assert!(extract_all(markup).is_empty());
    }
}
