use html_escape::{encode_double_quoted_attribute, encode_text};

use crate::adapter::DeliveryRecord;
use crate::source::types::SourceKind;

const DEFAULT_TITLE: &str = "Yangi e'lon";
const DESCRIPTION_LIMIT: usize = 500;
const YEAR_KEYS: [&str; 2] = ["Год выпуска", "Год"];
const YEAR_LINE: &str = "▫️ Yili: ";

/// Site attribute keys worth showing, with their label. `None` keeps the site's own wording.
fn allow_list(kind: SourceKind) -> &'static [(&'static str, Option<&'static str>)] {
    match kind {
        SourceKind::Avtoelon => &[
            ("Объем двигателя, л", Some("Hajm")),
            ("Объем двигателя", Some("Hajm")),
            ("Пробег", Some("Probeg")),
            ("Коробка передач", Some("Korobka")),
            ("Цвет", Some("Rangi")),
            ("Состояние краски", Some("Kraska holati")),
        ],
        SourceKind::Olx => &[
            ("Объем двигателя, л", Some("Hajm")),
            ("Объем двигателя", Some("Hajm")),
            ("Пробег", Some("Probeg")),
            ("Коробка передач", Some("Korobka")),
            ("Цвет", Some("Rangi")),
            ("Вид топлива", None),
            ("Кузов", None),
            ("Состояние краски", Some("Kraska holati")),
            ("Привод", None),
        ],
    }
}

/// Render the HTML message for one record. Every interpolated value is escaped.
pub fn format_message(record: &DeliveryRecord, kind: SourceKind) -> String {
    let href = encode_double_quoted_attribute(&record.url);
    let title = record.title.as_deref().unwrap_or(DEFAULT_TITLE);

    let mut msg = format!("🚗 <a href=\"{href}\"><b>{}</b></a>\n\n", encode_text(title));

    if let Some(price) = &record.price {
        msg.push_str(&format!("💰 <b>{}</b>\n\n", encode_text(price)));
    }

    let lines = attribute_lines(record, kind);
    // OLX pages always carry a year; alone it does not earn a details block
    let has_details = match kind {
        SourceKind::Olx => lines.iter().any(|l| !l.starts_with(YEAR_LINE)),
        SourceKind::Avtoelon => !lines.is_empty(),
    };
    if has_details {
        msg.push_str("📋 <b>Ma'lumotlar:</b>\n");
        for line in &lines {
            msg.push_str(line);
            msg.push('\n');
        }
        msg.push('\n');
    }

    let location = record.location.as_deref().or_else(|| record.attribute("Город"));
    if let Some(loc) = location.filter(|l| !l.trim().is_empty()) {
        msg.push_str(&format!("📍 <b>Manzil:</b> {}\n\n", encode_text(loc.trim())));
    }

    if let Some(desc) = record.description.as_deref().filter(|d| !d.trim().is_empty()) {
        msg.push_str(&format!("📝 {}\n\n", encode_text(&truncate(desc.trim(), DESCRIPTION_LIMIT))));
    }

    msg.push_str(&format!("🔗 <a href=\"{href}\">E'lonni to'liq ko'rish</a>"));
    msg
}

fn attribute_lines(record: &DeliveryRecord, kind: SourceKind) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(year) = YEAR_KEYS.iter().find_map(|k| record.attribute(k)) {
        lines.push(format!("{YEAR_LINE}{}", encode_text(year.trim())));
    }

    let mut used_labels: Vec<&str> = Vec::new();
    for &(key, label) in allow_list(kind) {
        let Some(value) = record.attribute(key) else { continue };
        let label = label.unwrap_or(key);
        if used_labels.contains(&label) {
            continue;
        }
        used_labels.push(label);
        let value = value.replace('\n', " ");
        lines.push(format!("▫️ {}: {}", encode_text(label), encode_text(value.trim())));
    }
    lines
}

/// Cut to `limit` characters, ending in `...` when anything was dropped.
fn truncate(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        return s.to_string();
    }
    let mut out: String = s.chars().take(limit - 3).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> DeliveryRecord {
        DeliveryRecord {
            url: "https://avtoelon.uz/a/show/200".into(),
            title: Some("Chevrolet Cobalt, 2019".into()),
            price: Some("9 800 у.е.".into()),
            location: None,
            attributes: vec![
                ("Город".into(), "Самарканд".into()),
                ("Год выпуска".into(), "2019".into()),
                ("Объем двигателя, л".into(), "1.5".into()),
                ("Объем двигателя".into(), "1.5 л".into()),
                ("Пробег".into(), "80 000 км".into()),
                ("Кузов".into(), "седан".into()),
                ("VIN".into(), "XWB...".into()),
            ],
            images: vec![],
            description: Some("Ideal holatda.".into()),
        }
    }

    #[test]
    fn avtoelon_layout_with_translated_labels() {
        let msg = format_message(&record(), SourceKind::Avtoelon);
        let expected = "🚗 <a href=\"https://avtoelon.uz/a/show/200\"><b>Chevrolet Cobalt, 2019</b></a>\n\n\
            💰 <b>9 800 у.е.</b>\n\n\
            📋 <b>Ma'lumotlar:</b>\n\
            ▫️ Yili: 2019\n\
            ▫️ Hajm: 1.5\n\
            ▫️ Probeg: 80 000 км\n\n\
            📍 <b>Manzil:</b> Самарканд\n\n\
            📝 Ideal holatda.\n\n\
            🔗 <a href=\"https://avtoelon.uz/a/show/200\">E'lonni to'liq ko'rish</a>";
        assert_eq!(msg, expected);
    }

    #[test]
    fn olx_keeps_untranslated_extras() {
        let msg = format_message(&record(), SourceKind::Olx);
        assert!(msg.contains("▫️ Кузов: седан\n"));
        assert!(!msg.contains("VIN"));
    }

    #[test]
    fn values_are_escaped() {
        let mut r = record();
        r.title = Some("<script>alert(1)</script> & co".into());
        r.url = "https://www.olx.uz/d/x?a=1&b=\"2\"".into();
        let msg = format_message(&r, SourceKind::Olx);
        assert!(msg.contains("&lt;script&gt;alert(1)&lt;/script&gt; &amp; co"));
        assert!(msg.contains("href=\"https://www.olx.uz/d/x?a=1&amp;b=&quot;2&quot;\""));
        assert!(!msg.contains("<script>"));
    }

    #[test]
    fn long_description_is_cut_to_limit() {
        let mut r = record();
        r.description = Some("ж".repeat(800));
        let msg = format_message(&r, SourceKind::Avtoelon);
        let line = msg.lines().find(|l| l.starts_with("📝")).unwrap();
        let body = line.trim_start_matches("📝 ");
        assert_eq!(body.chars().count(), DESCRIPTION_LIMIT);
        assert!(body.ends_with("..."));
    }

    #[test]
    fn bare_record_uses_default_title_and_skips_empty_blocks() {
        let r = DeliveryRecord { url: "https://www.olx.uz/d/obyavlenie/x-ID1.html".into(), ..Default::default() };
        let msg = format_message(&r, SourceKind::Olx);
        assert!(msg.starts_with("🚗 <a href=\"https://www.olx.uz/d/obyavlenie/x-ID1.html\"><b>Yangi e'lon</b></a>"));
        assert!(!msg.contains("Ma'lumotlar"));
        assert!(!msg.contains("💰"));
        assert!(msg.ends_with("E'lonni to'liq ko'rish</a>"));
    }

    #[test]
    fn olx_year_alone_gets_no_details_block() {
        let mut r = record();
        r.attributes = vec![("Год выпуска".into(), "2019".into())];
        let olx = format_message(&r, SourceKind::Olx);
        assert!(!olx.contains("Ma'lumotlar"));
        assert!(!olx.contains("Yili"));

        let avto = format_message(&r, SourceKind::Avtoelon);
        assert!(avto.contains("📋 <b>Ma'lumotlar:</b>\n▫️ Yili: 2019\n"));
    }

    #[test]
    fn formatting_is_deterministic() {
        assert_eq!(format_message(&record(), SourceKind::Olx), format_message(&record(), SourceKind::Olx));
    }
}
