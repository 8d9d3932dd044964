//! Format registry: supported, indexable, and canonical extension/MIME tables.
//!
//! All tables are `const` data. Lookup helpers normalize their input (leading
//! dot, case, MIME parameters) and set-returning accessors hand out owned
//! copies, so nothing outside this module can alter the tables.
//!
//! # Tables
//!
//! | Table | Purpose |
//! |-------|---------|
//! | [`CANONICAL_PAIRS`] | one canonical MIME per extension, one extension per MIME |
//! | [`EXTENSION_ALIASES`] | spellings folded into a canonical extension (`.jpeg` → `.jpg`) |
//! | [`ALIAS_MIME_TO_CANONICAL`] | non-canonical MIME strings → canonical pair |
//! | [`INDEXABLE_EXTENSIONS`] | ingested by the search index without staging |
//!
//! The supported extension and MIME sets are exactly the two columns of
//! [`CANONICAL_PAIRS`], which keeps the registry consistent by construction.

use std::collections::BTreeSet;

pub const GENERIC_BINARY_EXT: &str = ".bin";
pub const GENERIC_BINARY_MIME: &str = "application/octet-stream";

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOC: &str = "application/msword";
pub const MIME_XLS: &str = "application/vnd.ms-excel";
pub const MIME_PPT: &str = "application/vnd.ms-powerpoint";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_PPTX: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const MIME_OLE: &str = "application/vnd.ms-office";
pub const MIME_ZIP: &str = "application/zip";

/// Canonical `(extension, mime)` pairs. Both columns are unique.
pub const CANONICAL_PAIRS: &[(&str, &str)] = &[
    (".pdf", MIME_PDF),
    (".doc", MIME_DOC),
    (".docx", MIME_DOCX),
    (".ppt", MIME_PPT),
    (".pptx", MIME_PPTX),
    (".xls", MIME_XLS),
    (".xlsx", MIME_XLSX),
    (".csv", "text/csv"),
    (".tsv", "text/tab-separated-values"),
    (".txt", "text/plain"),
    (".md", "text/markdown"),
    (".html", "text/html"),
    (".css", "text/css"),
    (".json", "application/json"),
    (".tex", "text/x-tex"),
    (".py", "text/x-python"),
    (".js", "text/javascript"),
    (".ts", "application/typescript"),
    (".java", "text/x-java"),
    (".c", "text/x-c"),
    (".cpp", "text/x-c++"),
    (".cs", "text/x-csharp"),
    (".rb", "text/x-ruby"),
    (".php", "text/x-php"),
    (".go", "text/x-golang"),
    (".sh", "application/x-sh"),
    (".png", "image/png"),
    (".jpg", "image/jpeg"),
    (".zip", MIME_ZIP),
    (".ole", MIME_OLE),
    (GENERIC_BINARY_EXT, GENERIC_BINARY_MIME),
];

/// Alternate extension spellings and the canonical extension they fold into.
pub const EXTENSION_ALIASES: &[(&str, &str)] = &[
    (".jpeg", ".jpg"),
    (".htm", ".html"),
    (".markdown", ".md"),
];

/// Non-canonical MIME strings reported by other tools, mapped to a canonical pair.
pub const ALIAS_MIME_TO_CANONICAL: &[(&str, (&str, &str))] = &[
    // PDF
    ("application/x-pdf", (".pdf", MIME_PDF)),
    ("application/acrobat", (".pdf", MIME_PDF)),
    ("application/vnd.pdf", (".pdf", MIME_PDF)),
    ("application/nappdf", (".pdf", MIME_PDF)),
    // ZIP
    ("application/x-zip-compressed", (".zip", MIME_ZIP)),
    ("application/x-zip", (".zip", MIME_ZIP)),
    ("multipart/x-zip", (".zip", MIME_ZIP)),
    // OLE compound file
    ("application/cdfv2", (".ole", MIME_OLE)),
    ("application/x-ole-storage", (".ole", MIME_OLE)),
    ("application/x-cfb", (".ole", MIME_OLE)),
    // JPEG
    ("image/jpg", (".jpg", "image/jpeg")),
    ("image/pjpeg", (".jpg", "image/jpeg")),
    // Markdown
    ("text/x-markdown", (".md", "text/markdown")),
    // CSV / TSV
    ("text/x-comma-separated-values", (".csv", "text/csv")),
    ("application/csv", (".csv", "text/csv")),
    ("text/tsv", (".tsv", "text/tab-separated-values")),
    // Source code
    ("application/javascript", (".js", "text/javascript")),
    ("application/x-javascript", (".js", "text/javascript")),
    ("text/x-script.python", (".py", "text/x-python")),
    ("text/x-typescript", (".ts", "application/typescript")),
    ("application/x-shellscript", (".sh", "application/x-sh")),
    ("text/x-shellscript", (".sh", "application/x-sh")),
];

/// Extensions the search index ingests directly.
pub const INDEXABLE_EXTENSIONS: &[&str] = &[
    ".pdf", ".docx", ".pptx", ".txt", ".md", ".html", ".css", ".json", ".tex", ".py", ".js",
    ".ts", ".java", ".c", ".cpp", ".cs", ".rb", ".php", ".go", ".sh",
];

/// Lower-cases an extension, adds a missing leading dot, and folds aliases.
///
/// Returns `None` for empty input.
pub fn normalize_extension(ext: &str) -> Option<String> {
    let trimmed = ext.trim();
    if trimmed.is_empty() || trimmed == "." {
        return None;
    }
    let lower = trimmed.to_lowercase();
    let dotted = if lower.starts_with('.') {
        lower
    } else {
        format!(".{}", lower)
    };
    let folded = EXTENSION_ALIASES
        .iter()
        .find(|(alias, _)| *alias == dotted)
        .map(|(_, canonical)| canonical.to_string());
    Some(folded.unwrap_or(dotted))
}

/// Lower-cases a MIME type and drops parameters (`; charset=...`).
pub fn normalize_mime(mime: &str) -> String {
    mime.split(';').next().unwrap_or("").trim().to_lowercase()
}

/// Extension of a filename, normalized. `None` when the name has no extension.
pub fn extension_of(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let (stem, ext) = base.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }
    normalize_extension(ext)
}

pub fn is_supported_extension(ext: &str) -> bool {
    normalize_extension(ext)
        .map(|e| CANONICAL_PAIRS.iter().any(|(x, _)| *x == e))
        .unwrap_or(false)
}

pub fn is_supported_mime(mime: &str) -> bool {
    let m = normalize_mime(mime);
    !m.is_empty() && CANONICAL_PAIRS.iter().any(|(_, y)| *y == m)
}

pub fn is_indexable_extension(ext: &str) -> bool {
    normalize_extension(ext)
        .map(|e| INDEXABLE_EXTENSIONS.contains(&e.as_str()))
        .unwrap_or(false)
}

pub fn canonical_mime_for(ext: &str) -> Option<&'static str> {
    let e = normalize_extension(ext)?;
    CANONICAL_PAIRS
        .iter()
        .find(|(x, _)| *x == e)
        .map(|(_, mime)| *mime)
}

pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let m = normalize_mime(mime);
    CANONICAL_PAIRS
        .iter()
        .find(|(_, y)| *y == m)
        .map(|(ext, _)| *ext)
}

/// Canonical pair for a non-canonical MIME string, if one is registered.
pub fn resolve_alias(mime: &str) -> Option<(&'static str, &'static str)> {
    let m = normalize_mime(mime);
    ALIAS_MIME_TO_CANONICAL
        .iter()
        .find(|(alias, _)| *alias == m)
        .map(|(_, pair)| *pair)
}

/// Whether `(ext, mime)` is exactly one of the canonical pairs.
pub fn is_canonical_pair(ext: &str, mime: &str) -> bool {
    CANONICAL_PAIRS.iter().any(|(x, y)| *x == ext && *y == mime)
}

pub fn supported_extensions() -> BTreeSet<String> {
    CANONICAL_PAIRS.iter().map(|(e, _)| e.to_string()).collect()
}

pub fn supported_mimes() -> BTreeSet<String> {
    CANONICAL_PAIRS.iter().map(|(_, m)| m.to_string()).collect()
}

pub fn indexable_extensions() -> BTreeSet<String> {
    INDEXABLE_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}
