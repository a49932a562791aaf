//! Page envelopes for the two pagination flavours providers use.

use serde::Deserialize;
use serde_json::Value;

/// Page-number metadata, carried in the `X-Pagination` response header as
/// JSON, e.g. `{"page":2,"last_page":5,"total":480}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PageMeta {
    pub page: u32,
    pub last_page: u32,
}

impl PageMeta {
    pub const HEADER: &'static str = "x-pagination";

    /// `None` when the header is not valid JSON of the expected shape.
    pub fn from_header(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

/// Cursor envelope: `{"results":[...],"moreDataAvailable":true,"nextCursor":"..."}`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorPage {
    #[serde(default)]
    pub results: Vec<Value>,
    #[serde(default)]
    pub more_data_available: bool,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

impl CursorPage {
    /// Continuation cursor; requires both the flag and a non-empty cursor.
    pub fn next(&self) -> Option<&str> {
        if !self.more_data_available {
            return None;
        }
        self.next_cursor.as_deref().filter(|c| !c.is_empty())
    }
}

/// Items of a page-number response body: a bare array, or an object
/// wrapping the array under `data`. Anything else is an empty page.
pub fn page_items(body: Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("data") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}
