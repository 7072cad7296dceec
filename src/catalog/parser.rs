use std::sync::OnceLock;

use regex::{Captures, Regex};

/// One entry of a label manifest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogItem {
    pub id: u32,
    pub name: String,
    pub display_name: String,
}

const CRLF: &str = "\r\n";
const LF: &str = "\n";

fn item_pattern(newline: &str) -> String {
    format!(
        r#"item \{{{nl}  name: "(?P<name>.*)"{nl}  id: (?P<id>[0-9]+){nl}  display_name: "(?P<display_name>.*)"{nl}\}}"#,
        nl = newline
    )
}

fn crlf_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(&item_pattern(CRLF)).expect("catalog item pattern (CRLF)"))
}

fn lf_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(&item_pattern(LF)).expect("catalog item pattern (LF)"))
}

/// Parse a label manifest into catalog items, in document order.
///
/// Blocks are matched positionally (`name`, `id`, `display_name`). Blocks that
/// do not match the grammar are skipped; so are ids that do not fit a `u32`.
/// The CRLF form is tried first, and the LF form only if CRLF finds nothing.
/// Ids are not deduplicated here; see [`super::CatalogIndex`].
pub fn parse_catalog(text: &str) -> Vec<CatalogItem> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let mut items = collect_items(crlf_regex(), text);
    if items.is_empty() {
        items = collect_items(lf_regex(), text);
    }
    items
}

fn collect_items(regex: &Regex, text: &str) -> Vec<CatalogItem> {
    regex.captures_iter(text).filter_map(item_from).collect()
}

fn item_from(caps: Captures<'_>) -> Option<CatalogItem> {
    let raw_id = &caps["id"];
    let id = match raw_id.parse::<u32>() {
        Ok(id) => id,
        Err(_) => {
            log::debug!("catalog: skipping block with out-of-range id {}", raw_id);
            return None;
        }
    };
    Some(CatalogItem {
        id,
        name: caps["name"].to_string(),
        display_name: caps["display_name"].to_string(),
    })
}
