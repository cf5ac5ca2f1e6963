use core::time::Duration;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use crate::{
    scrape::{self, Listing},
    sheets::{self, SheetsClient, ValueRange},
    util::column_letter,
};

/// The tag row is a fixed convention of the sheet layout: row 2 labels each
/// column with the listing field it receives.
const TAG_ROW: u32 = 2;
const URL_TAG: &str = "url";

/// Courtesy pause between listings, so a long range does not hammer the
/// auction site.
const ROW_INTERVAL: Duration = Duration::from_secs(1);

/// Cooperative stop signal, shared with whoever drives the run. Checked at
/// row boundaries only; a row already in flight always finishes.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunResult {
    /// Rows whose scraped fields were written back.
    pub new_data_count: u32,
    /// Rows with a blank url cell.
    pub skipped_count: u32,
}

pub struct Context {
    pub sheets: SheetsClient,
    pub scraper: scrape::Context,
    pub cancel: CancelFlag,
}

fn tag_range_spec(sheet_name: &str) -> String {
    format!("{sheet_name}!{TAG_ROW}:{TAG_ROW}")
}

fn row_range_spec(sheet_name: &str, start_row: u32, end_row: Option<u32>) -> String {
    format!(
        "{sheet_name}!{start_row}:{}",
        end_row.map(|e| e.to_string()).unwrap_or_default()
    )
}

fn pad_row(row: &mut Vec<String>, width: usize) {
    if row.len() < width {
        row.resize(width, String::new());
    }
}

fn target_url(row: &[String], url_index: usize) -> Option<&str> {
    row.get(url_index)
        .map(|cell| cell.trim())
        .filter(|url| !url.is_empty())
}

/// One single-cell write per schema tag that names a listing field. Tags
/// the listing does not carry, and columns past `Z`, are left untouched.
fn build_updates(
    sheet_name: &str,
    tags: &[String],
    row_num: u32,
    listing: &Listing,
) -> Vec<ValueRange> {
    let mut updates = Vec::new();
    for (tag, value) in listing.entries() {
        let Some(index) = tags.iter().position(|t| t == tag) else {
            continue;
        };
        let Some(column) = column_letter(index) else {
            tracing::warn!(target: "sync", "tag {tag:?} maps past column Z, dropping");
            continue;
        };
        updates.push(ValueRange {
            range: format!("{sheet_name}!{column}{row_num}"),
            values: vec![vec![value.to_owned()]],
        });
    }
    updates
}

/// Walks the work rows of `[start_row, end_row]` (open-ended when `end_row`
/// is `None`), scrapes each row's listing URL and writes the extracted
/// fields back into the columns named by the tag row.
///
/// Failing to resolve the spreadsheet, the tag row or the work range aborts
/// the whole run. Everything per-row is logged and survived.
pub async fn sync_range(
    ctx: &Context,
    spreadsheet_url: &str,
    sheet_name: &str,
    start_row: u32,
    end_row: Option<u32>,
) -> anyhow::Result<RunResult> {
    let Some(spreadsheet_id) = sheets::extract_spreadsheet_id(spreadsheet_url) else {
        anyhow::bail!("invalid spreadsheet url: {spreadsheet_url}");
    };
    tracing::info!(target: "sync", "spreadsheet {spreadsheet_id}, sheet {sheet_name:?}, rows {start_row}..{end_row:?}");

    let tags = ctx
        .sheets
        .read_range(spreadsheet_id, &tag_range_spec(sheet_name))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("tag row {TAG_ROW} of {sheet_name:?} is empty"))?;

    let Some(url_index) = tags.iter().position(|t| t == URL_TAG) else {
        anyhow::bail!("no {URL_TAG:?} tag in row {TAG_ROW} of {sheet_name:?}");
    };
    tracing::info!(target: "sync", "{} tags, url column at index {url_index}", tags.len());

    let rows = ctx
        .sheets
        .read_range(spreadsheet_id, &row_range_spec(sheet_name, start_row, end_row))
        .await?;
    tracing::info!(target: "sync", "{} rows to process", rows.len());

    let mut result = RunResult::default();

    for (row_num, mut row) in (start_row..).zip(rows) {
        if ctx.cancel.is_cancelled() {
            tracing::info!(target: "sync", "cancelled before row {row_num}");
            break;
        }

        pad_row(&mut row, tags.len());
        let Some(url) = target_url(&row, url_index) else {
            tracing::info!(target: "sync", "row {row_num}: url cell is blank, skipping");
            result.skipped_count += 1;
            continue;
        };

        match scrape::scrape_listing(&ctx.scraper, url).await {
            // A dead fetch counts neither as skipped nor as new, matching
            // the behavior of the system this replaces.
            None => tracing::warn!(target: "sync", "row {row_num}: scrape failed"),
            Some(listing) => {
                let updates = build_updates(sheet_name, &tags, row_num, &listing);
                if updates.is_empty() {
                    tracing::info!(target: "sync", "row {row_num}: no writable columns");
                } else {
                    match ctx.sheets.batch_write(spreadsheet_id, &updates).await {
                        Ok(()) => {
                            tracing::info!(target: "sync", "\x1b[36mrow {row_num}: wrote {} cells\x1b[0m", updates.len());
                            result.new_data_count += 1;
                        }
                        Err(e) => {
                            tracing::error!(target: "sync", "\x1b[31mrow {row_num}: write failed: {e:?}\x1b[0m");
                        }
                    }
                }
            }
        }

        tokio::time::sleep(ROW_INTERVAL).await;
    }

    tracing::info!(target: "sync", "done: {} new, {} skipped", result.new_data_count, result.skipped_count);
    Ok(result)
}
