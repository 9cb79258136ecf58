//! Content-independent structural fingerprints for redesign detection.

use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// How many class names of an element contribute to its token.
const CLASSES_PER_TOKEN: usize = 3;

/// Hash of a document's tag/class skeleton.
///
/// Two fetches of the same page layout produce the same fingerprint even
/// when every product, price, and description differs; a changed
/// fingerprint on a source usually means a redesign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureFingerprint {
    pub hash: String,
    /// Depth bound used for the traversal
    pub depth: usize,
}

impl StructureFingerprint {
    pub fn as_str(&self) -> &str {
        &self.hash
    }
}

/// Fingerprint a parsed document with a depth-bounded traversal.
pub fn fingerprint(document: &Html, max_depth: usize) -> StructureFingerprint {
    let mut hasher = Sha256::new();
    walk(document.root_element(), 0, max_depth, &mut hasher);

    StructureFingerprint {
        hash: hex::encode(hasher.finalize()),
        depth: max_depth,
    }
}

fn walk(element: ElementRef<'_>, depth: usize, max_depth: usize, hasher: &mut Sha256) {
    if depth > max_depth {
        return;
    }

    let mut classes: Vec<&str> = element.value().classes().collect();
    classes.sort_unstable();
    classes.truncate(CLASSES_PER_TOKEN);

    hasher.update(element.value().name().as_bytes());
    hasher.update(b"[");
    hasher.update(classes.join(".").as_bytes());
    hasher.update(b"]");

    for child in element.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            walk(child_el, depth + 1, max_depth, hasher);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_changes_do_not_move_the_fingerprint() {
        let a = Html::parse_document(
            r#"<div class="grid"><div class="card"><span class="price">₹29</span></div></div>"#,
        );
        let b = Html::parse_document(
            r#"<div class="grid"><div class="card"><span class="price">₹9,999</span></div></div>"#,
        );
        assert_eq!(fingerprint(&a, 10), fingerprint(&b, 10));
    }

    #[test]
    fn structure_changes_move_the_fingerprint() {
        let a = Html::parse_document(r#"<div class="grid"><div class="card"></div></div>"#);
        let b = Html::parse_document(r#"<div class="grid"><section class="tile"></section></div>"#);
        assert_ne!(fingerprint(&a, 10), fingerprint(&b, 10));
    }

    #[test]
    fn depth_bound_ignores_deep_changes() {
        let shallow = "<div>".repeat(12) + "<span class=\"a\"></span>" + &"</div>".repeat(12);
        let changed = "<div>".repeat(12) + "<span class=\"b\"></span>" + &"</div>".repeat(12);
        // The differing span sits below the bound, so it cannot contribute.
        assert_eq!(
            fingerprint(&Html::parse_document(&shallow), 10),
            fingerprint(&Html::parse_document(&changed), 10)
        );
    }
}
