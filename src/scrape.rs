pub mod postage;

use reqwest::Client as Request;
use scraper::{ElementRef, Html, Selector};

use crate::util::digits_only;

const NA: &str = "N/A";

pub struct Context {
    pub client: Request,
    sel_title: Selector,
    sel_th: Selector,
    sel_seller: Selector,
    sel_price: Selector,
    sel_tax: Selector,
}

impl Context {
    #[must_use]
    pub fn new(client: Request) -> Self {
        Self {
            client,
            sel_title: Selector::parse("div.ProductTitle__title h1").unwrap(),
            sel_th: Selector::parse("th").unwrap(),
            sel_seller: Selector::parse(
                r#"a[href^="https://auctions.yahoo.co.jp/seller/"][data-cl-params*="seller"]"#,
            )
            .unwrap(),
            sel_price: Selector::parse("dd.Price__value").unwrap(),
            sel_tax: Selector::parse("span.Price__tax").unwrap(),
        }
    }
}

/// Everything extracted from one listing page. Field names double as the
/// column tags the synchronizer matches against the sheet's tag row.
#[derive(Debug)]
pub struct Listing {
    pub title: String,
    pub transaction_id: String,
    pub seller_id: String,
    pub seller_name: String,
    pub transaction_date: String,
    pub price: String,
    pub tax_included_price: String,
    pub total_postage: String,
}

impl Listing {
    #[must_use]
    pub fn entries(&self) -> [(&'static str, &str); 8] {
        [
            ("title", self.title.as_str()),
            ("transaction_id", self.transaction_id.as_str()),
            ("seller_id", self.seller_id.as_str()),
            ("seller_name", self.seller_name.as_str()),
            ("transaction_date", self.transaction_date.as_str()),
            ("price", self.price.as_str()),
            ("tax_included_price", self.tax_included_price.as_str()),
            ("total_postage", self.total_postage.as_str()),
        ]
    }
}

/// Text of the `td` following the first `th` whose text contains `label`.
fn label_cell_text(html: &Html, sel_th: &Selector, label: &str) -> Option<String> {
    let th = html
        .select(sel_th)
        .find(|th| th.text().any(|t| t.contains(label)))?;
    let td = th.next_siblings().find_map(ElementRef::wrap)?;
    (td.value().name() == "td").then(|| td.text().map(str::trim).collect())
}

/// Pulls every field except `total_postage` out of the static document.
/// A selector miss never aborts the other fields; each resolves to its
/// own sentinel.
#[must_use]
pub fn extract_listing(html: &Html, ctx: &Context) -> Listing {
    let title = html.select(&ctx.sel_title).next().map_or_else(
        || {
            tracing::warn!(target: "scrape", "title element missing");
            NA.to_owned()
        },
        |h1| h1.text().map(str::trim).collect(),
    );

    let transaction_id = label_cell_text(html, &ctx.sel_th, "オークションID").unwrap_or_else(|| {
        tracing::warn!(target: "scrape", "auction id cell missing");
        NA.to_owned()
    });

    let transaction_date = label_cell_text(html, &ctx.sel_th, "終了日時").unwrap_or_else(|| {
        tracing::warn!(target: "scrape", "end date cell missing");
        NA.to_owned()
    });

    let (seller_id, seller_name) = html
        .select(&ctx.sel_seller)
        .next()
        .and_then(|a| {
            let id = a.attr("href")?.split("/seller/").last()?.to_owned();
            let name = a.text().map(str::trim).collect();
            Some((id, name))
        })
        .unwrap_or_else(|| {
            tracing::warn!(target: "scrape", "seller link missing");
            (NA.to_owned(), NA.to_owned())
        });

    // The price element mixes the amount with annotation children; only the
    // first text node is the amount itself.
    let price = html.select(&ctx.sel_price).next().map_or_else(
        || {
            tracing::warn!(target: "scrape", "price element missing");
            NA.to_owned()
        },
        |dd| digits_only(dd.text().next().unwrap_or_default()),
    );

    let mut tax_included_price = html
        .select(&ctx.sel_tax)
        .next()
        .map_or_else(|| "0".to_owned(), |span| digits_only(&span.text().collect::<String>()));
    if tax_included_price == "0" {
        tax_included_price.clone_from(&price);
    }

    Listing {
        title,
        transaction_id,
        seller_id,
        seller_name,
        transaction_date,
        price,
        tax_included_price,
        total_postage: String::new(),
    }
}

async fn fetch_text(client: &Request, url: &str) -> reqwest::Result<String> {
    client.get(url).send().await?.text().await
}

/// Scrapes one listing URL: static fetch + parse for the base fields, then
/// a rendered-browser pass for the postage. Returns `None` only when the
/// page fetch itself fails; everything else degrades per field.
pub async fn scrape_listing(ctx: &Context, url: &str) -> Option<Listing> {
    tracing::info!(target: "scrape", "fetching {url}");

    let text = match fetch_text(&ctx.client, url).await {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!(target: "scrape", "fetch {url} failed: {e:?}");
            return None;
        }
    };

    let mut listing = {
        let html = Html::parse_document(&text);
        extract_listing(&html, ctx)
    };

    listing.total_postage = postage::resolve(url).await;

    tracing::debug!(target: "scrape", "{url} -> {listing:?}");
    Some(listing)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> Context {
        Context::new(Request::new())
    }

    const LISTING: &str = r#"<html><body>
        <div class="ProductTitle__title"><h1>限定 フィギュア 新品</h1></div>
        <table>
            <tr><th>オークションID</th><td>x123456789</td></tr>
            <tr><th>終了日時</th><td>2024.08.01（木）22:01</td></tr>
        </table>
        <a href="https://auctions.yahoo.co.jp/seller/shop_abc"
           data-cl-params="_cl_vmodule:seller;_cl_link:profile;">良いお店</a>
        <dl>
            <dd class="Price__value">12,800円
                <span class="Price__tax">（税込 14,080 円）</span>
            </dd>
        </dl>
    </body></html>"#;

    #[test]
    fn extracts_every_field() {
        let html = Html::parse_document(LISTING);
        let listing = extract_listing(&html, &ctx());

        assert_eq!(listing.title, "限定 フィギュア 新品");
        assert_eq!(listing.transaction_id, "x123456789");
        assert_eq!(listing.transaction_date, "2024.08.01（木）22:01");
        assert_eq!(listing.seller_id, "shop_abc");
        assert_eq!(listing.seller_name, "良いお店");
        assert_eq!(listing.price, "12800");
        assert_eq!(listing.tax_included_price, "14080");
        assert_eq!(listing.total_postage, "");
    }

    #[test]
    fn price_takes_only_the_first_text_node() {
        let html = Html::parse_document(
            r#"<dd class="Price__value">1,000円<span>（税 0 円）</span></dd>"#,
        );
        let listing = extract_listing(&html, &ctx());
        assert_eq!(listing.price, "1000");
    }

    #[test]
    fn missing_fields_resolve_to_sentinels_independently() {
        let html = Html::parse_document("<html><body><p>準備中</p></body></html>");
        let listing = extract_listing(&html, &ctx());

        assert_eq!(listing.title, "N/A");
        assert_eq!(listing.transaction_id, "N/A");
        assert_eq!(listing.transaction_date, "N/A");
        assert_eq!(listing.seller_id, "N/A");
        assert_eq!(listing.seller_name, "N/A");
        assert_eq!(listing.price, "N/A");
        // absent tax price falls back to the (sentinel) price
        assert_eq!(listing.tax_included_price, "N/A");
    }

    #[test]
    fn absent_tax_price_falls_back_to_price() {
        let html = Html::parse_document(r#"<dd class="Price__value">1,000円</dd>"#);
        let listing = extract_listing(&html, &ctx());
        assert_eq!(listing.price, "1000");
        assert_eq!(listing.tax_included_price, "1000");
    }

    #[test]
    fn zero_tax_price_falls_back_to_price() {
        let html = Html::parse_document(
            r#"<dd class="Price__value">1,000円</dd><span class="Price__tax">0円</span>"#,
        );
        let listing = extract_listing(&html, &ctx());
        assert_eq!(listing.tax_included_price, "1000");
    }

    #[test]
    fn seller_link_without_marker_attribute_is_ignored() {
        let html = Html::parse_document(
            r#"<a href="https://auctions.yahoo.co.jp/seller/shop_abc">店</a>"#,
        );
        let listing = extract_listing(&html, &ctx());
        assert_eq!(listing.seller_id, "N/A");
        assert_eq!(listing.seller_name, "N/A");
    }

    #[test]
    fn entries_expose_all_eight_tags() {
        let html = Html::parse_document(LISTING);
        let listing = extract_listing(&html, &ctx());
        let tags: Vec<&str> = listing.entries().iter().map(|(tag, _)| *tag).collect();
        assert_eq!(tags, [
            "title",
            "transaction_id",
            "seller_id",
            "seller_name",
            "transaction_date",
            "price",
            "tax_included_price",
            "total_postage",
        ]);
    }
}
