//! Filename derivation and normalization.
//!
//! Fetched content gets its name from, in order:
//!
//! 1. `Content-Disposition` (`filename*=charset''value`, then
//!    `filename="value"`, then bare `filename=value`)
//! 2. the basename of the URL path
//! 3. a generated `download_noname_<UTC timestamp><6 digits>`
//!
//! Whatever the source, the name is percent-decoded, unquoted, and cut to
//! its last path segment before use, so a header can never smuggle a
//! directory into the output path. [`standardize_file_name`] then produces
//! the final lower-case name with the detected extension.

use std::sync::LazyLock;

use chrono::Utc;
use percent_encoding::percent_decode_str;
use regex::Regex;

/// Prefix of generated names when neither header nor URL supplies one.
pub const FALLBACK_BASE: &str = "download_noname";

/// Characters that are unsafe in filenames on common platforms.
const DISALLOWED: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Percent-decodes, trims quotes and whitespace, and keeps the last path segment.
pub fn clean_name(raw: &str) -> String {
    let decoded = percent_decode_str(raw).decode_utf8_lossy();
    let trimmed = decoded.trim().trim_matches('"');
    trimmed
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim()
        .to_string()
}

/// `filename*=charset'lang'value`, quoted `filename="..."`, bare `filename=...`,
/// tried in that order. Group 1 holds the value.
static DISPOSITION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"(?i)filename\*\s*=\s*[^'";\s]*'[^']*'"?([^\s;"]+)"#,
        r#"(?i)filename\s*=\s*"([^"]+)""#,
        r#"(?i)filename\s*=\s*([^";]+)"#,
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Extracts a filename from a `Content-Disposition` header value.
/// Separators inside a quoted value are part of the name.
pub fn parse_content_disposition(header: &str) -> Option<String> {
    DISPOSITION_PATTERNS
        .iter()
        .filter_map(|re| re.captures(header))
        .filter_map(|caps| caps.get(1))
        .map(|m| clean_name(m.as_str()))
        .find(|name| !name.is_empty())
}

/// Decoded basename of a URL path, if non-empty.
pub fn url_basename(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    let name = clean_name(last);
    (!name.is_empty()).then_some(name)
}

/// `download_noname_<YYYYmmddHHMMSS><6 digits>`.
pub fn generated_name() -> String {
    let ts = Utc::now().format("%Y%m%d%H%M%S");
    let digits = uuid::Uuid::new_v4().as_u128() % 1_000_000;
    format!("{}_{}{:06}", FALLBACK_BASE, ts, digits)
}

/// Header first, URL basename second, generated name last.
pub fn derive_original_name(url: &str, content_disposition: Option<&str>) -> String {
    content_disposition
        .and_then(parse_content_disposition)
        .or_else(|| url_basename(url))
        .unwrap_or_else(generated_name)
}

/// Normalizes a filename.
///
/// - lower-cased
/// - spaces, dashes, and dots in the stem become `_`, runs collapse
/// - unsafe characters become `_`
/// - only the last dot survives; the extension keeps letters and digits
///
/// Returns `None` when the name has no usable extension. An empty stem
/// becomes `file`.
pub fn standardize_file_name(name: &str) -> Option<String> {
    let lower = name.trim().to_lowercase();
    let (stem, ext) = lower.rsplit_once('.')?;
    let ext: String = ext.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    if ext.is_empty() {
        return None;
    }

    let mut out = String::with_capacity(stem.len());
    for ch in stem.chars() {
        let mapped = if matches!(ch, ' ' | '-' | '.') || DISALLOWED.contains(&ch) || ch.is_control()
        {
            '_'
        } else {
            ch
        };
        if mapped == '_' && out.ends_with('_') {
            continue;
        }
        out.push(mapped);
    }
    let stem = out.trim_matches('_');
    let stem = if stem.is_empty() { "file" } else { stem };
    Some(format!("{}.{}", stem, ext))
}

/// Builds the final name from an original name and the detected extension,
/// dropping whatever extension the original carried.
pub fn compose_file_name(original_name: &str, detected_ext: &str) -> String {
    let base = clean_name(original_name);
    let stem = match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => base.as_str(),
    };
    let ext = detected_ext.trim_start_matches('.');
    standardize_file_name(&format!("{}.{}", stem, ext))
        .unwrap_or_else(|| format!("file.{}", ext))
}

/// Replaces unsafe characters in a single path component.
pub fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if DISALLOWED.contains(&c) || c.is_control() { '_' } else { c })
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standardize_examples() {
        let cases = [
            ("My File.PDF", "my_file.pdf"),
            ("My-File-Name.TXT", "my_file_name.txt"),
            ("report.v1.final.DOCX", "report_v1_final.docx"),
            ("12@file8&name.docx", "12@file8&name.docx"),
            ("complex name-v2.PY", "complex_name_v2.py"),
            ("  --weird--  .md", "weird.md"),
            ("a:b|c?.txt", "a_b_c.txt"),
            (".pdf", "file.pdf"),
        ];
        for (input, expected) in cases {
            assert_eq!(standardize_file_name(input).as_deref(), Some(expected), "{}", input);
        }
    }

    #[test]
    fn standardize_requires_extension() {
        assert_eq!(standardize_file_name("README"), None);
        assert_eq!(standardize_file_name("odd.!!"), None);
    }

    #[test]
    fn compose_replaces_extension() {
        assert_eq!(compose_file_name("Budget 2024.xls", ".pdf"), "budget_2024.pdf");
        assert_eq!(compose_file_name("noext", ".txt"), "noext.txt");
        assert_eq!(compose_file_name("../../etc/passwd", ".txt"), "passwd.txt");
        assert_eq!(compose_file_name("", ".md"), "file.md");
    }

    #[test]
    fn clean_name_decodes_and_strips_paths() {
        assert_eq!(clean_name("%22my%20report.pdf%22"), "my report.pdf");
        assert_eq!(clean_name("..%2F..%2Fsecret.txt"), "secret.txt");
        assert_eq!(clean_name("C:\\Users\\x\\doc.docx"), "doc.docx");
    }

    #[test]
    fn content_disposition_prefers_extended_form() {
        let header = "attachment; filename=\"plain.pdf\"; filename*=UTF-8''na%C3%AFve%20file.pdf";
        assert_eq!(parse_content_disposition(header).as_deref(), Some("naïve file.pdf"));
        assert_eq!(
            parse_content_disposition("attachment; filename=\"Q3 Report.xlsx\"").as_deref(),
            Some("Q3 Report.xlsx")
        );
        assert_eq!(
            parse_content_disposition("inline; FILENAME=data.csv").as_deref(),
            Some("data.csv")
        );
        assert_eq!(parse_content_disposition("attachment"), None);
    }

    #[test]
    fn quoted_filename_keeps_semicolons() {
        assert_eq!(
            parse_content_disposition("attachment; filename=\"Q3; final.pdf\"").as_deref(),
            Some("Q3; final.pdf")
        );
        assert_eq!(
            parse_content_disposition("attachment; filename=\"a;b.csv\"; size=12").as_deref(),
            Some("a;b.csv")
        );
        assert_eq!(
            parse_content_disposition("attachment;filename*=utf-8'en'r%C3%A9sum%C3%A9.docx").as_deref(),
            Some("résumé.docx")
        );
    }

    #[test]
    fn derive_falls_back_to_url_then_generated() {
        assert_eq!(
            derive_original_name("https://h.example/files/Annual%20Plan.docx?x=1", None),
            "Annual Plan.docx"
        );
        let generated = derive_original_name("https://h.example/", None);
        assert!(generated.starts_with("download_noname_"));
        let suffix = &generated["download_noname_".len()..];
        assert_eq!(suffix.len(), 20);
        assert!(suffix.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn sanitize_component_replaces_unsafe() {
        assert_eq!(sanitize_component("Q1/Q2: sales*"), "Q1_Q2_ sales_");
        assert_eq!(sanitize_component(".."), "_");
        assert_eq!(sanitize_component("  "), "_");
    }
}
