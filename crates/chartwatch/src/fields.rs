//! Declarative selector-to-field mapping for chart items.
//!
//! Selectors on the storefront are obfuscated class names that change without
//! notice, so they live in [`Selectors`] as data. [`FieldMapping`] turns them
//! into an ordered table of field specs: the selector path to descend from the
//! item container, how to read the final element, and the transform that
//! normalizes the raw value.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::{Field, TrackerError, TrackerResult};

/// CSS selectors for the chart page. Any subset can be overridden from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Selectors {
    /// Container of one chart item.
    pub item: String,
    /// App name view.
    pub name: String,
    /// Anchor carrying the details page URL.
    pub url: String,
    /// Parent of the price label.
    pub price_parent: String,
    /// Unclassed child of `price_parent` holding the price text.
    pub price_text: String,
    /// Parent of the icon image.
    pub image_parent: String,
    /// Image element under `image_parent`.
    pub image: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            item: ".ImZGtf.mpg5gc".to_string(),
            name: ".WsMG1c.nnK0zc".to_string(),
            url: ".JC71ub".to_string(),
            price_parent: ".VfPpfd.ZdBevf.i5DZme".to_string(),
            price_text: "span".to_string(),
            image_parent: ".ZYyTud.K3IMke.buPxGf".to_string(),
            image: "img".to_string(),
        }
    }
}

impl Selectors {
    /// Parse selector overrides from JSON. Missing keys keep their defaults.
    pub fn from_json(json: &str) -> TrackerResult<Self> {
        let selectors: Selectors = serde_json::from_str(json)
            .map_err(|e| TrackerError::Config(format!("invalid selectors JSON: {e}")))?;
        selectors.validate()?;
        Ok(selectors)
    }

    /// Read selector overrides from a JSON file.
    pub fn from_file(path: &Path) -> TrackerResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            TrackerError::Config(format!("cannot read selectors file {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    fn validate(&self) -> TrackerResult<()> {
        let entries = [
            ("item", &self.item),
            ("name", &self.name),
            ("url", &self.url),
            ("price_parent", &self.price_parent),
            ("price_text", &self.price_text),
            ("image_parent", &self.image_parent),
            ("image", &self.image),
        ];
        for (key, value) in entries {
            if value.trim().is_empty() {
                return Err(TrackerError::Config(format!("selector `{key}` is empty")));
            }
        }
        Ok(())
    }
}

/// How the last element of a field path is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadMode {
    InnerHtml,
    Text,
    Attribute(String),
}

/// Normalizes a raw value, or explains why it is unusable.
pub type Transform = fn(&str) -> Result<String, String>;

/// One row of the mapping table.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub field: Field,
    /// Selectors descended in order, starting from the item container.
    pub path: Vec<String>,
    pub read: ReadMode,
    pub transform: Transform,
}

/// The complete mapping from an item container to an [`crate::AppRecord`].
#[derive(Debug, Clone)]
pub struct FieldMapping {
    pub item_selector: String,
    pub fields: Vec<FieldSpec>,
}

impl FieldMapping {
    pub fn from_selectors(selectors: &Selectors) -> Self {
        let href = || ReadMode::Attribute("href".to_string());
        let fields = vec![
            FieldSpec {
                field: Field::Name,
                path: vec![selectors.name.clone()],
                read: ReadMode::InnerHtml,
                transform: decode_name,
            },
            FieldSpec {
                field: Field::Url,
                path: vec![selectors.url.clone()],
                read: href(),
                transform: non_empty,
            },
            FieldSpec {
                field: Field::Id,
                path: vec![selectors.url.clone()],
                read: href(),
                transform: parse_id,
            },
            FieldSpec {
                field: Field::Price,
                path: vec![selectors.price_parent.clone(), selectors.price_text.clone()],
                read: ReadMode::InnerHtml,
                transform: parse_price,
            },
            FieldSpec {
                field: Field::ImageUrl,
                path: vec![selectors.image_parent.clone(), selectors.image.clone()],
                read: ReadMode::Attribute("src".to_string()),
                transform: non_empty,
            },
        ];

        Self {
            item_selector: selectors.item.clone(),
            fields,
        }
    }
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self::from_selectors(&Selectors::default())
    }
}

/// Query-parameter marker that precedes the storefront id.
pub const ID_MARKER: &str = "?id=";

/// Decode the HTML entities the storefront emits in app names.
pub fn decode_name(raw: &str) -> Result<String, String> {
    let decoded = raw
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&");
    let decoded = decoded.trim();
    if decoded.is_empty() {
        return Err("empty name".to_string());
    }
    Ok(decoded.to_string())
}

/// Take the storefront id from the `?id=` query parameter of a details URL.
pub fn parse_id(url: &str) -> Result<String, String> {
    let (_, rest) = url
        .split_once(ID_MARKER)
        .ok_or_else(|| format!("missing {ID_MARKER} marker in {url:?}"))?;
    let id = rest.split(['&', '#']).next().unwrap_or_default().trim();
    if id.is_empty() {
        return Err(format!("empty id in {url:?}"));
    }
    Ok(id.to_string())
}

fn price_regex() -> &'static Regex {
    static PRICE: OnceLock<Regex> = OnceLock::new();
    PRICE.get_or_init(|| {
        Regex::new(r"^(\d+|\d{1,3}(,\d{3})+)(\.\d+)?$").expect("price regex is valid")
    })
}

/// Strip the currency symbol and validate a non-negative decimal price.
///
/// Commas are only accepted as thousands separators.
pub fn parse_price(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("free") {
        return Ok("0".to_string());
    }
    let amount = trimmed.strip_prefix('$').unwrap_or(trimmed).trim();
    if !price_regex().is_match(amount) {
        return Err(format!("not a non-negative decimal: {raw:?}"));
    }
    Ok(amount.replace(',', ""))
}

fn non_empty(raw: &str) -> Result<String, String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err("empty value".to_string());
    }
    Ok(value.to_string())
}
