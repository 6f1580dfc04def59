use scraper::{ElementRef, Html, Selector};

use super::{absolutize, collapse_whitespace, non_empty, push_unique, title_excluded, DeliveryRecord, MAX_IMAGES};

const BASE: &str = "https://avtoelon.uz";

/// Paid placement badges; anything else in the corner is informational.
const PROMO_BADGES: [&str; 3] = [
    "payment-package-corner__badge--vip-sale",
    "payment-package-corner__badge--zor-sale",
    "payment-package-corner__badge--alo-sale",
];

pub fn parse_listing(html: &str, filter: Option<&str>) -> Vec<String> {
    let doc = Html::parse_document(html);
    listing_hrefs(&doc, filter).unwrap_or_default()
}

fn listing_hrefs(doc: &Html, filter: Option<&str>) -> Option<Vec<String>> {
    let block_sel = Selector::parse("div.result-block").ok()?;
    let item_sel = Selector::parse("div.row.list-item.a-elem").ok()?;
    let link_sel = Selector::parse("a.js__advert-link[href]").ok()?;

    let block = doc.select(&block_sel).next()?;
    let mut out = Vec::new();
    for item in block.select(&item_sel) {
        if is_promoted(&item) {
            continue;
        }
        let Some(link) = item.select(&link_sel).next() else { continue };
        let title = collapse_whitespace(&link.text().collect::<String>());
        if title_excluded(&title, filter) {
            continue;
        }
        let Some(href) = link.value().attr("href").map(str::trim) else { continue };
        if href.starts_with("/a/show/") {
            push_unique(&mut out, href.to_string());
        }
    }
    Some(out)
}

fn is_promoted(item: &ElementRef) -> bool {
    let Ok(sel) = Selector::parse(".payment-package-corner span") else { return false };
    item.select(&sel).any(|badge| badge.value().classes().any(|c| PROMO_BADGES.contains(&c)))
}

pub fn parse_detail(html: &str, url: &str) -> Option<DeliveryRecord> {
    let doc = Html::parse_document(html);
    let product = product_root(&doc)?;

    let title = first_text(&product, &["h1.a-title__text", "h1"]);
    let price = first_text(&product, &["span.a-price__text", "div.a-price"]);
    let attributes = parameters(&product);
    let location = attributes.iter().find(|(k, _)| k == "Город").map(|(_, v)| v.clone());
    let description = first_raw(&product, "div.description-text");

    Some(DeliveryRecord {
        url: url.to_string(),
        title,
        price,
        location,
        attributes,
        images: photos(&product),
        description,
    })
}

fn product_root(doc: &Html) -> Option<ElementRef<'_>> {
    for s in [r#"div[itemtype="http://schema.org/Product"]"#, "div.item.product"] {
        let Ok(sel) = Selector::parse(s) else { continue };
        if let Some(node) = doc.select(&sel).next() {
            return Some(node);
        }
    }
    None
}

fn first_text(root: &ElementRef, selectors: &[&str]) -> Option<String> {
    for s in selectors {
        let Ok(sel) = Selector::parse(s) else { continue };
        if let Some(node) = root.select(&sel).next() {
            if let Some(t) = non_empty(collapse_whitespace(&node.text().collect::<String>())) {
                return Some(t);
            }
        }
    }
    None
}

fn first_raw(root: &ElementRef, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    let node = root.select(&sel).next()?;
    non_empty(node.text().collect::<String>().trim().to_string())
}

/// Definition list first, then the newer params block; later keys win.
fn parameters(root: &ElementRef) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = Vec::new();
    let mut put = |k: String, v: String| {
        if k.is_empty() || v.is_empty() { return; }
        match out.iter_mut().find(|(key, _)| *key == k) {
            Some(slot) => slot.1 = v,
            None => out.push((k, v)),
        }
    };

    if let (Ok(dl), Ok(dt), Ok(dd)) = (
        Selector::parse("dl.description-params"),
        Selector::parse("dt"),
        Selector::parse("dd"),
    ) {
        if let Some(list) = root.select(&dl).next() {
            let keys = list.select(&dt).map(|e| collapse_whitespace(&e.text().collect::<String>()));
            let values = list.select(&dd).map(|e| collapse_whitespace(&e.text().collect::<String>()));
            for (k, v) in keys.zip(values) {
                put(k, v);
            }
        }
    }

    if let (Ok(li), Ok(h4), Ok(span)) = (
        Selector::parse("ul.params-block__list li.params-block__list-item"),
        Selector::parse("h4.item__heading"),
        Selector::parse("span"),
    ) {
        for item in root.select(&li) {
            let (Some(head), Some(val)) = (item.select(&h4).next(), item.select(&span).next()) else { continue };
            put(
                collapse_whitespace(&head.text().collect::<String>()),
                collapse_whitespace(&val.text().collect::<String>()),
            );
        }
    }
    out
}

/// Main photo first, then full-size thumbnails.
fn photos(root: &ElementRef) -> Vec<String> {
    let mut out = Vec::new();

    if let (Ok(main), Ok(a), Ok(img)) = (
        Selector::parse("div.main-photo"),
        Selector::parse("a[href]"),
        Selector::parse("img[src]"),
    ) {
        if let Some(main) = root.select(&main).next() {
            let src = match main.select(&a).next().and_then(|e| e.value().attr("href")) {
                Some(href) => Some(href.to_string()),
                None => main
                    .select(&img)
                    .next()
                    .and_then(|e| e.value().attr("src"))
                    .map(|s| s.replace("-408x306.webp", "-full.webp")),
            };
            if let Some(abs) = src.and_then(|s| absolutize(BASE, &s)) {
                push_unique(&mut out, abs);
            }
        }
    }

    if let Ok(thumb) = Selector::parse("a.small-thumb[href]") {
        for t in root.select(&thumb) {
            let Some(href) = t.value().attr("href") else { continue };
            if !href.contains("-full.webp") {
                continue;
            }
            if let Some(abs) = absolutize(BASE, href) {
                push_unique(&mut out, abs);
            }
        }
    }

    out.truncate(MAX_IMAGES);
    out
}
