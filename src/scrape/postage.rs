use core::time::Duration;
use std::{ffi::OsStr, sync::LazyLock};

use headless_chrome::{Browser, LaunchOptions};
use regex::Regex;
use tokio::task::spawn_blocking;

/// Upper bound on the initial page structure becoming present.
const PAGE_TIMEOUT: Duration = Duration::from_secs(10);
/// Upper bound per shipping-fee selector variant.
const SELECTOR_TIMEOUT: Duration = Duration::from_secs(5);

/// Known markup variants for the shipping-fee element, most common first.
const POSTAGE_SELECTORS: [&str; 4] = [
    "span.PricepostageValue",
    "span.Price__postageValue",
    "dd.Price__postage",
    "span[data-react-unit-name='PostageValue']",
];

/// Written when the listing says the winner bears the shipping cost.
pub const CASH_ON_DELIVERY: &str = "着払い";

static YEN_AMOUNT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([\d,]+)円").unwrap());

/// Resolves the shipping fee of a listing. The fee markup is populated
/// client-side, so this needs a rendering session; one browser is launched
/// per call and torn down with it, error paths included. Every failure is
/// soft and yields an empty string.
pub async fn resolve(url: &str) -> String {
    let url = url.to_owned();
    match spawn_blocking(move || resolve_blocking(&url)).await {
        Ok(Ok(postage)) => postage,
        Ok(Err(e)) => {
            tracing::warn!(target: "postage", "browser extraction failed: {e:?}");
            String::new()
        }
        Err(e) => {
            tracing::warn!(target: "postage", "browser task failed: {e:?}");
            String::new()
        }
    }
}

fn resolve_blocking(url: &str) -> anyhow::Result<String> {
    // Dropping the Browser kills the chrome process, so every `?` below
    // still releases the session.
    let browser = Browser::new(LaunchOptions {
        headless: true,
        args: vec![
            OsStr::new("--no-sandbox"),
            OsStr::new("--disable-dev-shm-usage"),
        ],
        ..LaunchOptions::default()
    })?;

    let tab = browser.new_tab()?;
    tab.navigate_to(url)?;
    tab.wait_for_element_with_custom_timeout("body", PAGE_TIMEOUT)?;

    for selector in POSTAGE_SELECTORS {
        let Ok(element) = tab.wait_for_element_with_custom_timeout(selector, SELECTOR_TIMEOUT)
        else {
            continue;
        };
        let text = element.get_inner_text()?;
        tracing::debug!(target: "postage", "{selector} -> {text:?}");
        return Ok(classify(&text));
    }

    tracing::warn!(target: "postage", "no postage element on {url}");
    Ok(String::new())
}

/// Maps raw shipping-fee text onto the spreadsheet value: a yen amount with
/// grouping commas stripped, the cash-on-delivery sentinel for the two
/// buyer-pays phrasings, or the trimmed text as-is.
#[must_use]
pub fn classify(text: &str) -> String {
    let text = text.trim();
    if let Some(cap) = YEN_AMOUNT.captures(text) {
        cap[1].replace(',', "")
    } else if text.contains("着払い") || text.contains("落札者負担") {
        CASH_ON_DELIVERY.to_owned()
    } else {
        text.to_owned()
    }
}
