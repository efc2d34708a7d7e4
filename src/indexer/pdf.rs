//! Page-level text extraction with lopdf.

use std::path::Path;

use anyhow::{Context, Result, bail};
use lopdf::{Dictionary, Document, Object};
use tracing::{debug, warn};

/// Text of one physical page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// 1-based page number.
    pub number: u32,
    /// Locator shown to the user next to retrieved text: the document's
    /// own page label (`iv`, `A-3`) when it defines one, else `number`.
    pub label: String,
    pub text: String,
}

/// Loads every page that yields text, in document order.
///
/// Pages whose content stream cannot be decoded are skipped with a warning.
/// A document with no extractable text at all is an error: there would be
/// nothing to answer from.
pub fn load_pages<P: AsRef<Path>>(path: P) -> Result<Vec<Page>> {
    let path = path.as_ref();
    let doc = Document::load(path)
        .with_context(|| format!("failed to open PDF: {}", path.display()))?;

    let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
    let total = page_numbers.len();
    let label_ranges = page_label_ranges(&doc);
    debug!(
        path = %path.display(),
        pages = total,
        label_ranges = label_ranges.len(),
        "loaded PDF"
    );

    let mut pages = Vec::with_capacity(total);
    for number in page_numbers {
        let raw = match doc.extract_text(&[number]) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(page = number, error = %e, "skipping page without extractable text");
                continue;
            }
        };

        let text = normalize(&raw);
        if text.is_empty() {
            continue;
        }
        let label = page_label(&label_ranges, number.saturating_sub(1))
            .filter(|label| !label.is_empty())
            .unwrap_or_else(|| number.to_string());
        pages.push(Page {
            number,
            label,
            text,
        });
    }

    if pages.is_empty() {
        bail!(
            "no extractable text in {} ({} pages); scanned documents need OCR first",
            path.display(),
            total
        );
    }
    Ok(pages)
}

// ── Page labels ──────────────────────────────────────────────────────

/// Numbering style of one `/PageLabels` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LabelStyle {
    Decimal,
    UpperRoman,
    LowerRoman,
    UpperLetters,
    LowerLetters,
    /// Prefix only.
    None,
}

/// A range of pages sharing one labelling rule, starting at a 0-based page index.
#[derive(Debug, Clone, PartialEq)]
struct LabelRange {
    first_index: u32,
    style: LabelStyle,
    prefix: String,
    start: u32,
}

/// Reads the catalog's `/PageLabels` number tree, sorted by first page.
/// A document without one, or with a malformed one, yields no ranges.
fn page_label_ranges(doc: &Document) -> Vec<LabelRange> {
    let tree = doc
        .trailer
        .get(b"Root")
        .ok()
        .and_then(|root| resolve_dict(doc, root))
        .and_then(|catalog| catalog.get(b"PageLabels").ok())
        .and_then(|labels| resolve_dict(doc, labels));

    let mut ranges = Vec::new();
    if let Some(tree) = tree {
        collect_ranges(doc, tree, &mut ranges, 0);
    }
    ranges.sort_by_key(|r| r.first_index);
    ranges
}

fn resolve<'a>(doc: &'a Document, mut object: &'a Object) -> Option<&'a Object> {
    // Bounded so a reference cycle cannot loop forever
    for _ in 0..32 {
        match object {
            Object::Reference(id) => object = doc.get_object(*id).ok()?,
            other => return Some(other),
        }
    }
    None
}

fn resolve_dict<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Dictionary> {
    resolve(doc, object)?.as_dict().ok()
}

fn collect_ranges(doc: &Document, node: &Dictionary, ranges: &mut Vec<LabelRange>, depth: usize) {
    if depth > 16 {
        return;
    }

    if let Some(nums) = node
        .get(b"Nums")
        .ok()
        .and_then(|n| resolve(doc, n))
        .and_then(|n| n.as_array().ok())
    {
        for pair in nums.chunks(2) {
            let [key, value] = pair else { continue };
            let first_index = resolve(doc, key)
                .and_then(|k| k.as_i64().ok())
                .and_then(|k| u32::try_from(k).ok());
            let dict = resolve_dict(doc, value);
            if let (Some(first_index), Some(dict)) = (first_index, dict) {
                ranges.push(label_range(doc, first_index, dict));
            }
        }
    }

    if let Some(kids) = node
        .get(b"Kids")
        .ok()
        .and_then(|k| resolve(doc, k))
        .and_then(|k| k.as_array().ok())
    {
        for kid in kids {
            if let Some(kid) = resolve_dict(doc, kid) {
                collect_ranges(doc, kid, ranges, depth + 1);
            }
        }
    }
}

fn label_range(doc: &Document, first_index: u32, dict: &Dictionary) -> LabelRange {
    let style = match dict
        .get(b"S")
        .ok()
        .and_then(|s| resolve(doc, s))
        .and_then(|s| s.as_name().ok())
    {
        Some(b"D") => LabelStyle::Decimal,
        Some(b"R") => LabelStyle::UpperRoman,
        Some(b"r") => LabelStyle::LowerRoman,
        Some(b"A") => LabelStyle::UpperLetters,
        Some(b"a") => LabelStyle::LowerLetters,
        _ => LabelStyle::None,
    };
    let prefix = match dict.get(b"P").ok().and_then(|p| resolve(doc, p)) {
        Some(Object::String(bytes, _)) => decode_text_string(bytes),
        _ => String::new(),
    };
    let start = dict
        .get(b"St")
        .ok()
        .and_then(|s| resolve(doc, s))
        .and_then(|s| s.as_i64().ok())
        .and_then(|s| u32::try_from(s).ok())
        .filter(|s| *s >= 1)
        .unwrap_or(1);

    LabelRange {
        first_index,
        style,
        prefix,
        start,
    }
}

/// PDF text strings are UTF-16BE with a BOM, or single-byte otherwise.
fn decode_text_string(bytes: &[u8]) -> String {
    match bytes {
        [0xFE, 0xFF, rest @ ..] => {
            let units: Vec<u16> = rest
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

/// Label of the page at 0-based `index`, or `None` outside every range.
fn page_label(ranges: &[LabelRange], index: u32) -> Option<String> {
    let range = ranges.iter().rev().find(|r| r.first_index <= index)?;
    let value = range.start + (index - range.first_index);
    let numeral = match range.style {
        LabelStyle::Decimal => value.to_string(),
        LabelStyle::UpperRoman => roman(value),
        LabelStyle::LowerRoman => roman(value).to_lowercase(),
        LabelStyle::UpperLetters => letters(value),
        LabelStyle::LowerLetters => letters(value).to_lowercase(),
        LabelStyle::None => String::new(),
    };
    Some(format!("{}{numeral}", range.prefix))
}

fn roman(mut value: u32) -> String {
    const NUMERALS: [(u32, &str); 13] = [
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];
    let mut out = String::new();
    for (n, s) in NUMERALS {
        while value >= n {
            out.push_str(s);
            value -= n;
        }
    }
    out
}

/// `A`..`Z`, then `AA`..`ZZ`, `AAA`.. as the PDF format defines.
fn letters(value: u32) -> String {
    let value = value.max(1) - 1;
    let letter = char::from(b'A' + (value % 26) as u8);
    std::iter::repeat_n(letter, (value / 26 + 1) as usize).collect()
}

/// Strips trailing whitespace per line and surrounding blank lines.
fn normalize(raw: &str) -> String {
    raw.lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
