//! Google Sheets v4 `values` client for the legacy spreadsheet tabs.
//!
//! Rows travel as JSON objects keyed by the tab's column names; the column
//! order below is the order cells are written in.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::config::SheetsSettings;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SheetKind { Clients, Products, Stock }

impl SheetKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "clients" => Some(Self::Clients),
            "products" => Some(Self::Products),
            "stock" => Some(Self::Stock),
            _ => None,
        }
    }

    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Self::Clients => &["name", "phone", "notes"],
            Self::Products => &["id", "name", "brand", "category", "image1", "image2", "image3", "price"],
            Self::Stock => &["product_id", "flavor_id", "flavor", "purchased", "sold", "stock"],
        }
    }

    fn range<'a>(&self, s: &'a SheetsSettings) -> &'a str {
        match self { Self::Clients => &s.clients_range, Self::Products => &s.products_range, Self::Stock => &s.stock_range }
    }
}

/// `Tab!A2:C` split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct A1Range { pub sheet: String, pub start_col: String, pub start_row: u32, pub end_col: String }

impl A1Range {
    pub fn parse(range: &str) -> Option<Self> {
        let (sheet, cells) = range.rsplit_once('!')?;
        let (start, end) = cells.split_once(':')?;
        let split = |cell: &str| {
            let col: String = cell.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
            let row = cell[col.len()..].parse::<u32>().ok();
            (col, row)
        };
        let (start_col, start_row) = split(start);
        let (end_col, _) = split(end);
        if start_col.is_empty() || end_col.is_empty() { return None; }
        Some(Self { sheet: sheet.trim_matches('\'').to_string(), start_col, start_row: start_row.unwrap_or(1), end_col })
    }

    /// Single-row range, e.g. `Tab!A7:C7`.
    pub fn row(&self, row: u32) -> String {
        let sheet = if self.sheet.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') { self.sheet.clone() } else { format!("'{}'", self.sheet) };
        format!("{sheet}!{}{row}:{}{row}", self.start_col, self.end_col)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SheetsError {
    #[error("sheets integration is not configured: {0}")]
    NotConfigured(&'static str),
    #[error("invalid range {0}")]
    InvalidRange(String),
    #[error("row {0} is above the data range")]
    InvalidRow(u32),
    #[error("field {field} must be a whole number, got {value:?}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("sheets request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<SheetsError> for crate::StoreError {
    fn from(e: SheetsError) -> Self {
        match e {
            SheetsError::InvalidRow(_) | SheetsError::InvalidNumber { .. } => Self::Validation(e.to_string()),
            other => Self::Upstream(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ValueRange { #[serde(default)] values: Vec<Vec<Value>> }

#[derive(Clone)]
pub struct SheetsClient { http: reqwest::Client, settings: SheetsSettings }

impl SheetsClient {
    pub fn new(http: reqwest::Client, settings: SheetsSettings) -> Self { Self { http, settings } }

    fn url(&self, range_segment: &str) -> Result<url::Url, SheetsError> {
        if self.settings.spreadsheet_id.is_empty() { return Err(SheetsError::NotConfigured("SHEETS_SPREADSHEET_ID")); }
        let mut url = url::Url::parse(&self.settings.base_url).map_err(|_| SheetsError::NotConfigured("SHEETS_BASE_URL"))?;
        url.path_segments_mut().map_err(|_| SheetsError::NotConfigured("SHEETS_BASE_URL"))?
            .pop_if_empty().push(&self.settings.spreadsheet_id).push("values").push(range_segment);
        Ok(url)
    }

    fn authorize(&self, req: reqwest::RequestBuilder, write: bool) -> Result<reqwest::RequestBuilder, SheetsError> {
        match (&self.settings.access_token, &self.settings.api_key) {
            (Some(token), _) => Ok(req.bearer_auth(token)),
            (None, Some(key)) if !write => Ok(req.query(&[("key", key)])),
            _ => Err(SheetsError::NotConfigured("SHEETS_ACCESS_TOKEN")),
        }
    }

    fn range(&self, kind: SheetKind) -> Result<(String, A1Range), SheetsError> {
        let raw = kind.range(&self.settings);
        let parsed = A1Range::parse(raw).ok_or_else(|| SheetsError::InvalidRange(raw.to_string()))?;
        Ok((raw.to_string(), parsed))
    }

    /// Reads every row of the tab, each tagged with its sheet row number.
    pub async fn read(&self, kind: SheetKind) -> Result<Vec<Value>, SheetsError> {
        let (raw, parsed) = self.range(kind)?;
        let req = self.authorize(self.http.get(self.url(&raw)?), false)?;
        let body: ValueRange = req.send().await?.error_for_status()?.json().await?;
        Ok(body.values.into_iter().enumerate().map(|(i, cells)| {
            let mut obj = row_to_object(kind, &cells);
            obj.insert("row".into(), json!(parsed.start_row + i as u32));
            Value::Object(obj)
        }).collect())
    }

    pub async fn append(&self, kind: SheetKind, record: &Map<String, Value>) -> Result<Value, SheetsError> {
        let (raw, _) = self.range(kind)?;
        let cells = object_to_row(kind, record)?;
        let req = self.http.post(self.url(&format!("{raw}:append"))?)
            .query(&[("valueInputOption", "USER_ENTERED"), ("insertDataOption", "INSERT_ROWS")])
            .json(&json!({ "majorDimension": "ROWS", "values": [cells] }));
        let resp = self.authorize(req, true)?.send().await?.error_for_status()?;
        tracing::info!(?kind, "sheet row appended");
        Ok(resp.json().await?)
    }

    pub async fn update(&self, kind: SheetKind, row: u32, record: &Map<String, Value>) -> Result<Value, SheetsError> {
        let (_, parsed) = self.range(kind)?;
        if row < parsed.start_row { return Err(SheetsError::InvalidRow(row)); }
        let target = parsed.row(row);
        let cells = object_to_row(kind, record)?;
        let req = self.http.put(self.url(&target)?)
            .query(&[("valueInputOption", "USER_ENTERED")])
            .json(&json!({ "range": target, "majorDimension": "ROWS", "values": [cells] }));
        let resp = self.authorize(req, true)?.send().await?.error_for_status()?;
        tracing::info!(?kind, row, "sheet row updated");
        Ok(resp.json().await?)
    }
}

fn cell_text(v: &Value) -> String {
    match v { Value::String(s) => s.trim().to_string(), Value::Null => String::new(), other => other.to_string() }
}

pub fn row_to_object(kind: SheetKind, cells: &[Value]) -> Map<String, Value> {
    kind.columns().iter().enumerate()
        .map(|(i, col)| (col.to_string(), Value::String(cells.get(i).map(cell_text).unwrap_or_default())))
        .collect()
}

/// Orders a record's fields by column. Stock rows get `stock` recomputed
/// as `purchased - sold`; any submitted value is ignored.
pub fn object_to_row(kind: SheetKind, record: &Map<String, Value>) -> Result<Vec<String>, SheetsError> {
    let mut cells: Vec<String> = kind.columns().iter().map(|c| record.get(*c).map(cell_text).unwrap_or_default()).collect();
    if kind == SheetKind::Stock {
        let number = |field: &'static str, idx: usize| -> Result<i64, SheetsError> {
            let raw = &cells[idx];
            if raw.is_empty() { return Ok(0); }
            raw.parse().map_err(|_| SheetsError::InvalidNumber { field, value: raw.clone() })
        };
        let stock = number("purchased", 3)? - number("sold", 4)?;
        cells[5] = stock.to_string();
    }
    Ok(cells)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_a1_range() {
        let r = A1Range::parse("'Stock 2024'!A2:F").unwrap();
        assert_eq!(r.sheet, "Stock 2024");
        assert_eq!(r.start_row, 2);
        assert_eq!(r.row(9), "'Stock 2024'!A9:F9");
        assert_eq!(A1Range::parse("Clientes!A2:C").unwrap().row(3), "Clientes!A3:C3");
        assert!(A1Range::parse("A2:F").is_none());
    }

    #[test]
    fn test_stock_row_recomputed() {
        let record = json!({ "product_id": "p1", "flavor_id": "f1", "flavor": "Mint", "purchased": "12", "sold": 5, "stock": "999" });
        let row = object_to_row(SheetKind::Stock, record.as_object().unwrap()).unwrap();
        assert_eq!(row, vec!["p1", "f1", "Mint", "12", "5", "7"]);
        let bad = json!({ "purchased": "doce" });
        assert!(matches!(object_to_row(SheetKind::Stock, bad.as_object().unwrap()), Err(SheetsError::InvalidNumber { field: "purchased", .. })));
    }

    #[test]
    fn test_row_to_object_pads_missing_cells() {
        let obj = row_to_object(SheetKind::Clients, &[json!("Ana"), json!(5491155551234u64)]);
        assert_eq!(obj["phone"], json!("5491155551234"));
        assert_eq!(obj["notes"], json!(""));
    }

    #[test]
    fn test_url_requires_spreadsheet() {
        let settings = SheetsSettings { base_url: "https://sheets.googleapis.com/v4/spreadsheets".into(), spreadsheet_id: String::new(), api_key: None, access_token: None, clients_range: "Clientes!A2:C".into(), products_range: "Productos!A2:H".into(), stock_range: "Stock!A2:F".into() };
        let client = SheetsClient::new(reqwest::Client::new(), settings.clone());
        assert!(matches!(client.url("x"), Err(SheetsError::NotConfigured(_))));
        let client = SheetsClient::new(reqwest::Client::new(), SheetsSettings { spreadsheet_id: "abc".into(), ..settings });
        assert_eq!(client.url("Clientes!A2:C").unwrap().as_str(), "https://sheets.googleapis.com/v4/spreadsheets/abc/values/Clientes!A2:C");
    }
}
