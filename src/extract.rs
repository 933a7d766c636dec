//! Tolerant extraction of structured product data from model output.
//!
//! Chat replies carry up to two tagged blocks inside free text:
//!
//! ```text
//! Berikut produk yang saya rekomendasikan:
//!
//! [PRODUCT_CARD]
//! { "products": [{ "id": "TS001", "name": "..." }], "category": "Casual" }
//! [/PRODUCT_CARD]
//!
//! [PRODUCT_DETAILS]
//! { "details": [{ "name": "...", "description": "...", "reason": "...", "tips": "..." }] }
//! [/PRODUCT_DETAILS]
//! ```
//!
//! The closing marker is optional; a missing one extends the block to the end
//! of the text. Each block body is decoded by three ordered strategies:
//!
//! 1. **Strict**: the whole body (minus any Markdown code fence) as JSON.
//! 2. **Key recovery**: the array under the expected key (`products` or
//!    `details`) is cut out with a permissive pattern and parsed alone.
//! 3. **Give up**: the block contributes an empty structure.
//!
//! [`extract`] is total: it never fails and, at worst, returns the input
//! text with empty card and details.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::AssistError;

pub const DEFAULT_CATEGORY: &str = "Rekomendasi Produk";
pub const SYNTHESIZED_REASON: &str = "Produk yang sesuai dengan kebutuhan Anda";

/// Delimiters and recovery key for one tagged block kind.
#[derive(Debug, Clone, Copy)]
pub struct BlockTag {
    pub open: &'static str,
    pub close: &'static str,
    pub key: &'static str,
}

pub const CARD_TAG: BlockTag = BlockTag {
    open: "[PRODUCT_CARD]",
    close: "[/PRODUCT_CARD]",
    key: "products",
};

pub const DETAILS_TAG: BlockTag = BlockTag {
    open: "[PRODUCT_DETAILS]",
    close: "[/PRODUCT_DETAILS]",
    key: "details",
};

static SECTION_LABELS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)Bagian [12][ -]*.*?:",
        r"(?i)Rekomendasi Produk[ -]*.*?:",
        r"(?i)Detail Produk[ -]*.*?:",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("section label pattern"))
    .collect()
});

static BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("blank run pattern"));

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\s*(.*?)\s*```$").expect("code fence pattern"));

// ============ Payload types ============

/// A product the model proposed. Names are untrusted until reconciled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProposedProduct {
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductCard {
    #[serde(default)]
    pub products: Vec<ProposedProduct>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub category: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductDetail {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub reason: String,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub tips: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct DetailsBlock {
    #[serde(default)]
    details: Vec<ProductDetail>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedPayload {
    pub clean_text: String,
    pub card: ProductCard,
    pub details: Vec<ProductDetail>,
    /// A block was present but strict parsing failed.
    pub degraded: bool,
}

fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

pub(crate) fn lenient_opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(value_to_string(Value::deserialize(d)?))
}

pub(crate) fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(value_to_string(Value::deserialize(d)?).unwrap_or_default())
}

// ============ Block grammar ============

/// Byte range of a tagged block: `start..end` covers the markers,
/// `body` is the interior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BlockSpan {
    start: usize,
    body_start: usize,
    body_end: usize,
    end: usize,
}

/// Find the first block of `tag`, tolerating a missing closing marker.
fn locate_block(text: &str, tag: BlockTag) -> Option<BlockSpan> {
    let start = text.find(tag.open)?;
    let body_start = start + tag.open.len();
    match text[body_start..].find(tag.close) {
        Some(rel) => Some(BlockSpan {
            start,
            body_start,
            body_end: body_start + rel,
            end: body_start + rel + tag.close.len(),
        }),
        None => Some(BlockSpan {
            start,
            body_start,
            body_end: text.len(),
            end: text.len(),
        }),
    }
}

fn remove_block(text: &str, tag: BlockTag) -> String {
    match locate_block(text, tag) {
        Some(span) => {
            let mut out = String::with_capacity(text.len());
            out.push_str(&text[..span.start]);
            out.push_str(&text[span.end..]);
            out.trim().to_string()
        }
        None => text.to_string(),
    }
}

fn strip_code_fence(body: &str) -> &str {
    let trimmed = body.trim();
    match CODE_FENCE.captures(trimmed).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => trimmed,
    }
}

/// Strategy 1: the whole body as JSON.
pub fn parse_strict<T: for<'de> Deserialize<'de>>(body: &str) -> Option<T> {
    serde_json::from_str(strip_code_fence(body)).ok()
}

/// Strategy 2: the array under `key`, up to its first `]` or the end of
/// the body, wrapped and parsed on its own.
pub fn recover_array<T: for<'de> Deserialize<'de>>(body: &str, key: &str) -> Option<Vec<T>> {
    let pattern = format!(r#""{}"\s*:\s*\[([\s\S]*?)(\]|$)"#, regex::escape(key));
    let re = Regex::new(&pattern).ok()?;
    let inner = re.captures(body)?.get(1)?.as_str().trim();
    serde_json::from_str(&format!("[{}]", inner)).ok()
}

/// Outcome of decoding one block body.
#[derive(Debug, Clone, PartialEq)]
enum Decoded<T> {
    Strict(T),
    Recovered(T),
    Empty,
}

fn decode_card(body: &str) -> Decoded<ProductCard> {
    if let Some(card) = parse_strict::<ProductCard>(body) {
        return Decoded::Strict(card);
    }
    match recover_array::<ProposedProduct>(body, CARD_TAG.key) {
        Some(products) => Decoded::Recovered(ProductCard {
            products,
            category: DEFAULT_CATEGORY.to_string(),
        }),
        None => Decoded::Empty,
    }
}

fn decode_details(body: &str) -> Decoded<Vec<ProductDetail>> {
    if let Some(block) = parse_strict::<DetailsBlock>(body) {
        return Decoded::Strict(block.details);
    }
    match recover_array::<ProductDetail>(body, DETAILS_TAG.key) {
        Some(details) => Decoded::Recovered(details),
        None => Decoded::Empty,
    }
}

fn strip_section_labels(text: &str) -> String {
    SECTION_LABELS
        .iter()
        .fold(text.to_string(), |acc, re| re.replace_all(&acc, "").into_owned())
}

/// Split raw model text into display text plus card and details payloads.
pub fn extract(raw: &str) -> ExtractedPayload {
    let mut clean = raw.to_string();
    let mut card = ProductCard::default();
    let mut details = Vec::new();
    let mut degraded = false;

    if let Some(span) = locate_block(&clean, CARD_TAG) {
        match decode_card(&clean[span.body_start..span.body_end]) {
            Decoded::Strict(parsed) => card = parsed,
            Decoded::Recovered(parsed) => {
                warn!(
                    error = %AssistError::ExtractionDegraded("product card recovered from array".into()),
                    products = parsed.products.len(),
                    "Product card was not valid JSON"
                );
                card = parsed;
                degraded = true;
            }
            Decoded::Empty => {
                warn!(
                    error = %AssistError::ExtractionDegraded("product card unreadable".into()),
                    "Product card could not be parsed"
                );
                degraded = true;
            }
        }
        clean = remove_block(&clean, CARD_TAG);
    }

    if let Some(span) = locate_block(&clean, DETAILS_TAG) {
        match decode_details(&clean[span.body_start..span.body_end]) {
            Decoded::Strict(parsed) => details = parsed,
            Decoded::Recovered(parsed) => {
                warn!(
                    error = %AssistError::ExtractionDegraded("product details recovered from array".into()),
                    details = parsed.len(),
                    "Product details were not valid JSON"
                );
                details = parsed;
                degraded = true;
            }
            Decoded::Empty => {
                warn!(
                    error = %AssistError::ExtractionDegraded("product details unreadable".into()),
                    "Product details could not be parsed"
                );
                degraded = true;
            }
        }
        clean = remove_block(&clean, DETAILS_TAG);
    }

    if !card.products.is_empty() && details.is_empty() {
        details = card
            .products
            .iter()
            .map(|p| ProductDetail {
                name: p.name.clone(),
                description: p.description.clone().unwrap_or_default(),
                reason: SYNTHESIZED_REASON.to_string(),
                tips: None,
            })
            .collect();
    }

    // Labels are stripped only once both blocks are gone, so a label
    // pattern can never consume a block marker.
    let clean = strip_section_labels(&clean);
    let clean_text = BLANK_RUNS.replace_all(clean.trim(), "\n\n").into_owned();

    ExtractedPayload {
        clean_text,
        card,
        details,
        degraded,
    }
}

/// The outermost `{ ... }` span of a reply (first `{` to last `}`), for
/// prompts that ask for a bare JSON object.
pub fn json_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse a bare-JSON-object reply into `T`, trying the outermost object
/// first and the whole text second.
pub fn parse_json_reply<T: for<'de> Deserialize<'de>>(text: &str) -> Result<T, AssistError> {
    if let Some(span) = json_object_span(text) {
        if let Ok(parsed) = serde_json::from_str(span) {
            return Ok(parsed);
        }
    }
    serde_json::from_str(text.trim())
        .map_err(|e| AssistError::MalformedUpstreamResponse(format!("reply is not JSON: {}", e)))
}
