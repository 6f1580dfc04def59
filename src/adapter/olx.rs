use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::{collapse_whitespace, non_empty, push_unique, title_excluded, DeliveryRecord, MAX_IMAGES};

const IMAGE_HOST: &str = "apollo.olxcdn.com";
const IMAGE_SIZE: &str = "s=1280x1024";

pub fn parse_listing(html: &str, filter: Option<&str>) -> Vec<String> {
    let doc = Html::parse_document(html);
    listing_hrefs(&doc, filter).unwrap_or_default()
}

fn listing_hrefs(doc: &Html, filter: Option<&str>) -> Option<Vec<String>> {
    let grid_sel = Selector::parse("div[data-testid=listing-grid]").ok()?;
    let card_sel = Selector::parse("div[data-cy=l-card]").ok()?;
    let marker_sel = Selector::parse("#div-gpt-liting-after-promoted").ok()?;

    let grid = doc.select(&grid_sel).next()?;
    // Cards above the marker are the paid block.
    let mut past_marker = doc.select(&marker_sel).next().is_none();

    let mut out = Vec::new();
    for node in doc.root_element().descendants() {
        let Some(el) = ElementRef::wrap(node) else { continue };
        if !past_marker {
            past_marker = marker_sel.matches(&el);
            continue;
        }
        if !card_sel.matches(&el) || !el.ancestors().any(|a| a.id() == grid.id()) {
            continue;
        }
        if is_promoted(&el) {
            continue;
        }
        let Some(href) = card_href(&el) else { continue };
        if title_excluded(&card_title(&el), filter) {
            continue;
        }
        push_unique(&mut out, href);
    }
    Some(out)
}

fn is_promoted(card: &ElementRef) -> bool {
    card.text().any(|t| {
        let t = t.trim().to_uppercase();
        t == "TOP" || t == "ТОП"
    })
}

fn card_href(card: &ElementRef) -> Option<String> {
    let a_sel = Selector::parse("a[href]").ok()?;
    let href = card.select(&a_sel).next()?.value().attr("href")?.trim();
    if href.starts_with("/d/obyavlenie/") || href.contains("/ID") {
        Some(href.to_string())
    } else {
        None
    }
}

fn card_title(card: &ElementRef) -> String {
    for s in ["[data-cy=ad-card-title]", "h4", "h6"] {
        let Ok(sel) = Selector::parse(s) else { continue };
        if let Some(node) = card.select(&sel).next() {
            return collapse_whitespace(&node.text().collect::<String>());
        }
    }
    String::new()
}

pub fn parse_detail(html: &str, url: &str) -> Option<DeliveryRecord> {
    let doc = Html::parse_document(html);

    let title = first_text(&doc, &["[data-cy=offer_title] h4", "[data-testid=offer_title] h4", "[data-cy=offer_title]", "h1"]);
    let price = first_text(&doc, &["[data-testid=ad-price-container] h3", "[data-testid=prices-wrapper] h3"]);
    let description = first_text_raw(&doc, &["[data-cy=ad_description] div", "[data-cy=ad_description]"]);
    if title.is_none() && price.is_none() && description.is_none() {
        return None;
    }

    let attributes = parameters(&doc);
    let location = map_location(&doc).or_else(|| {
        attributes
            .iter()
            .find(|(k, _)| k == "Город" || k == "Местоположение")
            .map(|(_, v)| v.clone())
    });

    Some(DeliveryRecord {
        url: url.to_string(),
        title,
        price,
        location,
        attributes,
        images: gallery_images(&doc),
        description,
    })
}

fn first_text(doc: &Html, selectors: &[&str]) -> Option<String> {
    first_text_raw(doc, selectors).map(|t| collapse_whitespace(&t)).and_then(non_empty)
}

fn first_text_raw(doc: &Html, selectors: &[&str]) -> Option<String> {
    for s in selectors {
        let Ok(sel) = Selector::parse(s) else { continue };
        if let Some(node) = doc.select(&sel).next() {
            let text = node.text().collect::<String>().trim().to_string();
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

/// `key: value` lines from the parameters block; lines without a colon are badges.
fn parameters(doc: &Html) -> Vec<(String, String)> {
    let Ok(sel) = Selector::parse("[data-testid=ad-parameters-container] p") else { return Vec::new() };
    doc.select(&sel)
        .filter_map(|p| {
            let text = collapse_whitespace(&p.text().collect::<String>());
            let (k, v) = text.split_once(':')?;
            let (k, v) = (k.trim(), v.trim());
            if k.is_empty() || v.is_empty() { None } else { Some((k.to_string(), v.to_string())) }
        })
        .collect()
}

fn map_location(doc: &Html) -> Option<String> {
    let sel = Selector::parse("[data-testid=map-aside-section] p").ok()?;
    let parts: Vec<String> = doc
        .select(&sel)
        .map(|p| collapse_whitespace(&p.text().collect::<String>()))
        .filter(|t| !t.is_empty() && t != "Местоположение" && t != "Location")
        .collect();
    non_empty(parts.join(", "))
}

fn gallery_images(doc: &Html) -> Vec<String> {
    static SIZE_RE: OnceLock<Regex> = OnceLock::new();
    let size_re = SIZE_RE.get_or_init(|| Regex::new(r"s=\d+x\d+").unwrap());

    let Ok(sel) = Selector::parse("img") else { return Vec::new() };
    let mut out = Vec::new();
    for img in doc.select(&sel) {
        let attrs = img.value();
        let Some(src) = attrs.attr("src").or_else(|| attrs.attr("data-src")) else { continue };
        if !src.contains(IMAGE_HOST) || src.contains("static") {
            continue;
        }
        push_unique(&mut out, size_re.replace(src, IMAGE_SIZE).into_owned());
        if out.len() >= MAX_IMAGES {
            break;
        }
    }
    out
}
