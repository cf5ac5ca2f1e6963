use core::time::Duration;
use std::sync::LazyLock;

use regex::Regex;
use reqwest::{
    Client as Request,
    header::{AUTHORIZATION, HeaderMap, HeaderValue},
};
use serde::{Deserialize, Serialize};

const ENDPOINT: &str = "https://sheets.googleapis.com/v4/spreadsheets";

static SPREADSHEET_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/spreadsheets/d/([a-zA-Z0-9-_]+)").unwrap());

/// The id path segment of a spreadsheet URL; the only part of the URL the
/// API calls use.
#[must_use]
pub fn extract_spreadsheet_id(url: &str) -> Option<&str> {
    SPREADSHEET_ID
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// One A1 range with its cell values, as the values API speaks it.
#[derive(Debug, Serialize, Deserialize)]
pub struct ValueRange {
    pub range: String,
    #[serde(default)]
    pub values: Vec<Vec<String>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchUpdateBody<'a> {
    value_input_option: &'static str,
    data: &'a [ValueRange],
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchGetResponse {
    #[serde(default)]
    value_ranges: Vec<ValueRange>,
}

/// Thin client for the sheet values API. Stateless per call; one instance
/// is shared across a whole run. Token acquisition is the caller's problem,
/// the client only carries the bearer header.
pub struct SheetsClient {
    http: Request,
}

impl SheetsClient {
    pub fn new(token: &str) -> anyhow::Result<Self> {
        let mut auth = HeaderValue::try_from(format!("Bearer {token}"))?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let http = Request::builder()
            .default_headers(headers)
            .connect_timeout(const { Duration::from_secs(8) })
            .build()?;
        Ok(Self { http })
    }

    /// Rows of cell strings for an A1 range like `シート1!3:9`. The range
    /// travels as a query parameter, so sheet names need no escaping here.
    pub async fn read_range(
        &self,
        spreadsheet_id: &str,
        range: &str,
    ) -> anyhow::Result<Vec<Vec<String>>> {
        let url = format!("{ENDPOINT}/{spreadsheet_id}/values:batchGet");
        let body: BatchGetResponse = self
            .http
            .get(url)
            .query(&[("ranges", range)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(body
            .value_ranges
            .into_iter()
            .next()
            .map(|r| r.values)
            .unwrap_or_default())
    }

    /// Writes every range in `data` in one request, `USER_ENTERED` so the
    /// sheet parses numbers and dates the way a typing user would get.
    pub async fn batch_write(&self, spreadsheet_id: &str, data: &[ValueRange]) -> anyhow::Result<()> {
        let url = format!("{ENDPOINT}/{spreadsheet_id}/values:batchUpdate");
        let body = BatchUpdateBody {
            value_input_option: "USER_ENTERED",
            data,
        };
        self.http
            .post(url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spreadsheet_id_comes_from_the_d_segment() {
        assert_eq!(
            extract_spreadsheet_id(
                "https://docs.google.com/spreadsheets/d/1aBc-123_xyz/edit#gid=0"
            ),
            Some("1aBc-123_xyz")
        );
    }

    #[test]
    fn urls_without_the_segment_do_not_resolve() {
        assert_eq!(extract_spreadsheet_id("https://docs.google.com/document/d/x"), None);
        assert_eq!(extract_spreadsheet_id(""), None);
    }

    #[test]
    fn batch_update_payload_shape() {
        let data = [ValueRange {
            range: "シート1!D7".to_owned(),
            values: vec![vec!["Widget".to_owned()]],
        }];
        let body = BatchUpdateBody {
            value_input_option: "USER_ENTERED",
            data: &data,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({
                "valueInputOption": "USER_ENTERED",
                "data": [{"range": "シート1!D7", "values": [["Widget"]]}],
            })
        );
    }

    #[test]
    fn value_ranges_deserialize_without_values() {
        // the API omits `values` for empty ranges
        let body: BatchGetResponse =
            serde_json::from_str(r#"{"valueRanges": [{"range": "s!2:2"}]}"#).unwrap();
        assert_eq!(body.value_ranges.len(), 1);
        assert!(body.value_ranges[0].values.is_empty());

        let empty: BatchGetResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.value_ranges.is_empty());
    }
}
