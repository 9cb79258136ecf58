//! DOM heuristics: finding product containers with no source-specific
//! knowledge.
//!
//! Three sub-strategies over the parsed document:
//!
//! 1. Repeated-structure detection: sibling groups with a shared
//!    structural signature where each member carries a currency amount and
//!    an image, which is the shape of a product grid.
//! 2. Price–image proximity: the smallest ancestor enclosing both a
//!    plausible product image and a currency amount.
//! 3. Detail-link pattern matching: anchors whose href looks like a
//!    product-detail URL, attributed to their enclosing priced container.
//!
//! Matches score compositionally (name, price, image, detail URL), and a
//! high-confidence container may yield a learned selector for cheap replay
//! on the next pass.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use super::selectors::derive_selector;
use super::validate::{self, promote_heuristic};
use super::{resolve_url, ExtractionHints};
use crate::types::{CandidateDraft, ExtractionMethod, ExtractorConfig, ProductCandidate};

/// Ancestor walk bounds for the proximity and link sub-strategies.
const PROXIMITY_ANCESTORS: usize = 6;
const LINK_ANCESTORS: usize = 4;

struct Selectors {
    any: Selector,
    img: Selector,
    anchor: Selector,
    itemprop_name: Selector,
    headings: Selector,
    name_classes: Selector,
}

fn selectors() -> &'static Selectors {
    static SELECTORS: OnceLock<Selectors> = OnceLock::new();
    SELECTORS.get_or_init(|| Selectors {
        any: Selector::parse("*").expect("static selector"),
        img: Selector::parse("img[src]").expect("static selector"),
        anchor: Selector::parse("a[href]").expect("static selector"),
        itemprop_name: Selector::parse(r#"[itemprop="name"]"#).expect("static selector"),
        headings: Selector::parse("h1,h2,h3,h4,h5,h6").expect("static selector"),
        name_classes: Selector::parse(
            r#"[class*="name"],[class*="Name"],[class*="title"],[class*="Title"]"#,
        )
        .expect("static selector"),
    })
}

/// Common product-detail URL shapes.
fn detail_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(?:/p/|/products?/|/items?/|/dp/|/gp/product|/buy/|[?&](?:pid|productid|product_id|sku|skuid|itemid|item_id)=)",
        )
        .expect("static detail-url regex")
    })
}

/// Image src fragments that are never product photography.
const IMAGE_SRC_DENYLIST: &[&str] = &["icon", "logo", "sprite", "placeholder", "avatar", "badge"];

/// Everything the heuristic tier found in one pass.
pub(crate) struct HeuristicHarvest {
    pub candidates: Vec<ProductCandidate>,
    /// Stable selector derived from the first container that scored at or
    /// above the learn threshold, if any did.
    pub learnable: Option<String>,
}

/// Run all three sub-strategies, deduplicating by container.
pub(crate) fn extract<'a>(
    document: &'a Html,
    hints: &ExtractionHints,
    config: &ExtractorConfig,
) -> HeuristicHarvest {
    let mut seen = HashSet::new();
    let mut scored: Vec<(ElementRef<'a>, ProductCandidate)> = Vec::new();

    let mut consider = |container: ElementRef<'a>, method: ExtractionMethod| {
        if !seen.insert(container.id()) {
            return;
        }
        let draft = container_draft(container, hints, config);
        if let Some(candidate) = promote_heuristic(draft, method, config) {
            scored.push((container, candidate));
        }
    };

    for container in repeated_structure_containers(document, config) {
        consider(container, ExtractionMethod::RepeatedStructure);
    }
    for container in price_image_containers(document) {
        consider(container, ExtractionMethod::PriceImageProximity);
    }
    for container in detail_link_containers(document) {
        consider(container, ExtractionMethod::DetailLinkPattern);
    }

    let learnable = scored
        .iter()
        .filter(|(_, candidate)| candidate.confidence >= config.selector_learn_threshold)
        .find_map(|(container, _)| derive_selector(*container));

    HeuristicHarvest {
        candidates: scored.into_iter().map(|(_, candidate)| candidate).collect(),
        learnable,
    }
}

/// Assemble a draft from whatever a container holds. Shared with the
/// learned-selector replay tier.
pub(crate) fn container_draft(
    container: ElementRef<'_>,
    hints: &ExtractionHints,
    config: &ExtractorConfig,
) -> CandidateDraft {
    let sels = selectors();

    let name = find_name(container, config);

    let amounts = validate::price_amounts(&container_text(container));
    let price = amounts.first().copied();
    let original_price =
        price.and_then(|selling| validate::original_from_amounts(selling, &amounts[1..], config));

    let image_url = container
        .select(&sels.img)
        .find(|img| plausible_product_image(*img))
        .and_then(|img| img.value().attr("src"))
        .map(|src| resolve_url(hints, src));

    let detail_url = container
        .select(&sels.anchor)
        .filter_map(|a| a.value().attr("href"))
        .find(|href| !href.starts_with('#') && !href.starts_with("javascript:"))
        .map(|href| resolve_url(hints, href));

    CandidateDraft {
        name,
        price,
        original_price,
        image_url,
        detail_url,
    }
}

/// Pick the most name-like text in a container: explicit product
/// annotations first, then headings, then named classes, then link text
/// and image alt.
fn find_name(container: ElementRef<'_>, config: &ExtractorConfig) -> Option<String> {
    let sels = selectors();

    let from_elements = container
        .select(&sels.itemprop_name)
        .chain(container.select(&sels.headings))
        .chain(container.select(&sels.name_classes))
        .chain(container.select(&sels.anchor))
        .map(|el| el.text().collect::<Vec<_>>().join(" "));

    let from_attrs = container
        .select(&sels.anchor)
        .filter_map(|a| a.value().attr("title").map(String::from))
        .chain(
            container
                .select(&sels.img)
                .filter_map(|img| img.value().attr("alt").map(String::from)),
        );

    from_elements
        .chain(from_attrs)
        .map(|raw| validate::clean_name(&raw))
        .find(|name| validate::valid_name(name, config) && validate::price_amounts(name).is_empty())
}

fn container_text(container: ElementRef<'_>) -> String {
    container.text().collect::<Vec<_>>().join(" ")
}

fn has_price(container: ElementRef<'_>) -> bool {
    !validate::price_amounts(&container_text(container)).is_empty()
}

fn has_image(container: ElementRef<'_>) -> bool {
    container
        .select(&selectors().img)
        .any(plausible_product_image)
}

fn plausible_product_image(img: ElementRef<'_>) -> bool {
    let Some(src) = img.value().attr("src") else {
        return false;
    };
    if src.is_empty() || src.starts_with("data:") {
        return false;
    }
    let lowered = src.to_lowercase();
    !IMAGE_SRC_DENYLIST
        .iter()
        .any(|fragment| lowered.contains(fragment))
}

/// Sub-strategy a: sibling groups sharing a structural signature, where at
/// least `min_group_size` members each hold a price and an image.
fn repeated_structure_containers<'a>(
    document: &'a Html,
    config: &ExtractorConfig,
) -> Vec<ElementRef<'a>> {
    let mut out = Vec::new();

    for parent in document.select(&selectors().any) {
        let children: Vec<ElementRef<'a>> =
            parent.children().filter_map(ElementRef::wrap).collect();
        if children.len() < config.min_group_size {
            continue;
        }

        // First pass: count qualifying members per signature. Second pass
        // re-walks children in document order so output order never
        // depends on map iteration.
        let mut qualifying: HashMap<(&str, usize, String), usize> = HashMap::new();
        for child in &children {
            if has_price(*child) && has_image(*child) {
                *qualifying.entry(signature(*child)).or_insert(0) += 1;
            }
        }

        for child in &children {
            let sig = signature(*child);
            if qualifying.get(&sig).copied().unwrap_or(0) >= config.min_group_size
                && has_price(*child)
                && has_image(*child)
            {
                out.push(*child);
            }
        }
    }

    out
}

/// Structural signature: tag + element-child count + first classes.
fn signature(element: ElementRef<'_>) -> (&str, usize, String) {
    let child_count = element.children().filter_map(ElementRef::wrap).count();
    let mut classes: Vec<&str> = element.value().classes().collect();
    classes.sort_unstable();
    classes.truncate(2);
    (element.value().name(), child_count, classes.join("."))
}

/// Sub-strategy b: for each plausible product image, the smallest
/// enclosing container that also holds a currency amount.
fn price_image_containers<'a>(document: &'a Html) -> Vec<ElementRef<'a>> {
    let mut out = Vec::new();

    for img in document.select(&selectors().img) {
        if !plausible_product_image(img) {
            continue;
        }
        let container = img
            .ancestors()
            .filter_map(ElementRef::wrap)
            .take(PROXIMITY_ANCESTORS)
            .find(|ancestor| has_price(*ancestor));
        if let Some(container) = container {
            out.push(container);
        }
    }

    out
}

/// Sub-strategy c: anchors with product-detail URL shapes, attributed to
/// their nearest priced ancestor.
fn detail_link_containers<'a>(document: &'a Html) -> Vec<ElementRef<'a>> {
    let mut out = Vec::new();

    for anchor in document.select(&selectors().anchor) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if !detail_url_regex().is_match(href) {
            continue;
        }
        let container = anchor
            .ancestors()
            .filter_map(ElementRef::wrap)
            .take(LINK_ANCESTORS)
            .find(|ancestor| has_price(*ancestor));
        if let Some(container) = container {
            out.push(container);
        }
    }

    out
}
