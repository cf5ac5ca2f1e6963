use core::time::Duration;

use clap::Parser;
use yscr::{
    scrape,
    sheets::SheetsClient,
    sync::{self, CancelFlag},
};

/// Scrape the auction listings referenced by a spreadsheet's url column and
/// write the extracted fields back into its tagged columns.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Full URL of the target spreadsheet
    spreadsheet_url: String,

    /// Sheet tab holding the tag row and the work rows
    #[arg(long, default_value = "ヤフオク購入履歴")]
    sheet_name: String,

    /// First work row (1-based, inclusive; rows 1 and 2 hold the header
    /// and the tag row)
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(3..))]
    start_row: u32,

    /// Last work row (inclusive); the range is open-ended when omitted
    #[arg(long)]
    end_row: Option<u32>,

    /// OAuth access token for the spreadsheet API
    #[arg(long, env = "YAUC_SHEETS_TOKEN", hide_env_values = true)]
    token: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init_timed();

    let args = Args::parse();
    if let Some(end_row) = args.end_row
        && end_row < args.start_row
    {
        anyhow::bail!("end row {end_row} is before start row {}", args.start_row);
    }

    let fetcher = reqwest::Client::builder()
        .connect_timeout(const { Duration::from_secs(8) })
        .build()?;

    let ctx = sync::Context {
        sheets: SheetsClient::new(&args.token)?,
        scraper: scrape::Context::new(fetcher),
        cancel: CancelFlag::new(),
    };

    {
        let cancel = ctx.cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!(target: "main", "interrupt received, stopping after the current row");
                cancel.cancel();
            }
        });
    }

    let result = sync::sync_range(
        &ctx,
        &args.spreadsheet_url,
        &args.sheet_name,
        args.start_row,
        args.end_row,
    )
    .await?;

    if ctx.cancel.is_cancelled() {
        println!("scraping run cancelled");
    } else {
        println!("new rows written: {}", result.new_data_count);
        println!("rows skipped (blank url): {}", result.skipped_count);
    }

    Ok(())
}
