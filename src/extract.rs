use crate::error::{AppError, Result};
use crate::schema::{self, DataPoint, Language, Page};
use tracing::warn;

// The ISG renders every value as a label/value table row. Extraction scans
// table blocks locally instead of matching patterns against the whole
// document: find each <table>, walk its <tr> rows, compare the first cell
// against the label we want. First match wins; labels are unique on a
// well-formed page.

/// Extract the raw tokens for every data point configured on this page.
/// Each field resolves independently, so a single missing row degrades only
/// that field.
pub fn extract_page(page: Page, html: &str) -> Vec<(&'static DataPoint, Result<String>)> {
    let lang = page_language(html);
    let tables = tag_blocks(html, "table");

    schema::points_on(page)
        .map(|point| (point, extract_point(point, lang, html, &tables)))
        .collect()
}

fn extract_point(
    point: &DataPoint,
    lang: Language,
    html: &str,
    tables: &[&str],
) -> Result<String> {
    let row_label = point.row.text(lang);

    let scope = match point.table {
        Some(section) => {
            let header = section.text(lang);
            table_with_header(tables, header).ok_or_else(|| {
                AppError::SchemaMismatch(format!(
                    "no '{}' table on {} page",
                    header,
                    point.page.name()
                ))
            })?
        }
        None => html,
    };

    labelled_value(scope, row_label).ok_or_else(|| {
        AppError::SchemaMismatch(format!(
            "row '{}' not found on {} page",
            row_label,
            point.page.name()
        ))
    })
}

/// The UI language configured on the device, read from the language marker
/// div the ISG puts on every page. Unknown markers fall back to English.
pub fn page_language(html: &str) -> Language {
    match div_text_by_class(html, "eingestelle_sprache") {
        Some(marker) => Language::from_marker(&marker).unwrap_or_else(|| {
            warn!(marker = %marker, "unsupported ISG language, assuming English");
            Language::English
        }),
        None => {
            warn!("no language marker on page, assuming English");
            Language::English
        }
    }
}

/// The document title, used to verify the host actually is an ISG.
pub fn page_title(html: &str) -> Option<String> {
    let title = tag_blocks(html, "title").into_iter().next()?;
    let text = clean_text(title);
    (!text.is_empty()).then_some(text)
}

/// MAC address from the Profile > Network page, scanned over the page text.
pub fn mac_address(html: &str) -> Option<String> {
    let re = regex::Regex::new(r"(?:[0-9a-fA-F]{2}[:-]){5}[0-9a-fA-F]{2}").unwrap();
    let text = clean_text(html);
    re.find(&text).map(|m| m.as_str().to_string())
}

/// ISG firmware version from the Diagnosis > System page, assembled from the
/// Major/Minor/Revision rows of the "ISG" table.
pub fn isg_version(html: &str) -> Option<String> {
    let lang = page_language(html);
    let tables = tag_blocks(html, "table");
    // the "ISG" header is not localized
    let table = table_with_header(&tables, "ISG")?;

    let major = labelled_value(table, schema::Label::MajorVersion.text(lang))?;
    let minor = labelled_value(table, schema::Label::MinorVersion.text(lang))?;
    let revision = labelled_value(table, schema::Label::Revision.text(lang))?;

    Some(format!("{}.{}.{}", major, minor, revision))
}

/// Find the value cell next to the row whose first cell matches `label`.
fn labelled_value(scope: &str, label: &str) -> Option<String> {
    for row in tag_blocks(scope, "tr") {
        let cells = row_cells(row);
        if cells.len() < 2 {
            continue;
        }
        if clean_text(cells[0]) == label {
            return cell_token(cells[1]);
        }
    }
    None
}

/// The table whose first header cell matches `header`.
fn table_with_header<'a>(tables: &[&'a str], header: &str) -> Option<&'a str> {
    tables.iter().copied().find(|table| {
        tag_blocks(table, "tr")
            .first()
            .map(|row| {
                row_cells(row)
                    .first()
                    .map(|cell| clean_text(cell) == header)
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    })
}

/// Raw token of a value cell: the icon src for status icons, the cleaned
/// text otherwise.
fn cell_token(cell: &str) -> Option<String> {
    if let Some(src) = img_src(cell) {
        return Some(src);
    }
    let text = clean_text(cell);
    (!text.is_empty()).then_some(text)
}

/// Case-insensitive substring search starting at `from`, returning the byte
/// offset of the match.
fn find_ci(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    let h = haystack.as_bytes();
    let n = needle.as_bytes();
    if n.is_empty() || from + n.len() > h.len() {
        return None;
    }
    (from..=h.len() - n.len()).find(|&i| h[i..i + n.len()].eq_ignore_ascii_case(n))
}

/// Inner content of every `<tag ...>...</tag>` block, in document order.
/// Same-name nesting is not handled; the ISG markup does not nest tables or
/// rows.
fn tag_blocks<'a>(html: &'a str, tag: &str) -> Vec<&'a str> {
    tag_blocks_at(html, tag).into_iter().map(|(_, b)| b).collect()
}

fn tag_blocks_at<'a>(html: &'a str, tag: &str) -> Vec<(usize, &'a str)> {
    let open = format!("<{}", tag);
    let close = format!("</{}", tag);
    let mut out = Vec::new();
    let mut pos = 0;

    while let Some(start) = find_ci(html, &open, pos) {
        let after = start + open.len();
        // reject prefix matches, e.g. <th against <thead
        match html.as_bytes().get(after) {
            Some(b'>') | Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') | Some(b'/') => {}
            _ => {
                pos = after;
                continue;
            }
        }
        let Some(content_start) = find_ci(html, ">", after).map(|i| i + 1) else {
            break;
        };
        let Some(end) = find_ci(html, &close, content_start) else {
            break;
        };
        out.push((start, &html[content_start..end]));
        pos = end + close.len();
    }

    out
}

/// Header and data cells of a row, in document order.
fn row_cells<'a>(row: &'a str) -> Vec<&'a str> {
    let mut cells: Vec<(usize, &str)> = tag_blocks_at(row, "th");
    cells.extend(tag_blocks_at(row, "td"));
    cells.sort_by_key(|(pos, _)| *pos);
    cells.into_iter().map(|(_, c)| c).collect()
}

fn img_src(cell: &str) -> Option<String> {
    let img = find_ci(cell, "<img", 0)?;
    let tag_end = find_ci(cell, ">", img)?;
    let tag = &cell[img..tag_end];

    let src = find_ci(tag, "src=", 0)? + 4;
    let rest = &tag[src..];
    match rest.chars().next()? {
        quote @ ('"' | '\'') => {
            let value = &rest[1..];
            let end = value.find(quote)?;
            Some(value[..end].to_string())
        }
        _ => rest.split_whitespace().next().map(|v| v.to_string()),
    }
}

/// Text content of the first non-empty div carrying the given class.
fn div_text_by_class(html: &str, class: &str) -> Option<String> {
    let mut pos = 0;
    while let Some(start) = find_ci(html, "<div", pos) {
        let open_end = find_ci(html, ">", start)?;
        let open_tag = &html[start..open_end];
        pos = open_end + 1;

        if find_ci(open_tag, class, 0).is_none() {
            continue;
        }
        let end = find_ci(html, "</div", open_end)?;
        let text = clean_text(&html[open_end + 1..end]);
        if !text.is_empty() {
            return Some(text);
        }
        pos = end + 1;
    }
    None
}

/// Strip tags, decode the entities the ISG emits, collapse whitespace.
fn clean_text(fragment: &str) -> String {
    let stripped = strip_tags(fragment);
    let decoded = decode_entities(&stripped);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_tags(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut in_tag = false;
    for c in fragment.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                // keep adjacent cell contents separated
                out.push(' ');
            }
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

fn decode_entities(text: &str) -> String {
    let mut out = text.to_string();
    for (entity, replacement) in [
        ("&nbsp;", " "),
        ("&amp;", "&"),
        ("&lt;", "<"),
        ("&gt;", ">"),
        ("&quot;", "\""),
        ("&#39;", "'"),
        ("&deg;", "°"),
        ("&Auml;", "Ä"),
        ("&auml;", "ä"),
        ("&Ouml;", "Ö"),
        ("&ouml;", "ö"),
        ("&Uuml;", "Ü"),
        ("&uuml;", "ü"),
        ("&szlig;", "ß"),
    ] {
        if out.contains(entity) {
            out = out.replace(entity, replacement);
        }
    }
    out
}
