//! `vstage formats`: print the format registry.

use crate::formats::{
    is_indexable_extension, ALIAS_MIME_TO_CANONICAL, CANONICAL_PAIRS, EXTENSION_ALIASES,
};

/// How the stager treats a supported extension.
fn handling(ext: &str) -> &'static str {
    if is_indexable_extension(ext) {
        return "indexable";
    }
    match ext {
        ".doc" | ".xls" | ".ppt" => "convert",
        ".xlsx" | ".csv" | ".tsv" => "markdown",
        ".zip" => "unzip",
        _ => "fallback",
    }
}

pub fn run_formats() {
    println!("{:<8} {:<74} handling", "ext", "mime");
    for (ext, mime) in CANONICAL_PAIRS {
        println!("{:<8} {:<74} {}", ext, mime, handling(ext));
    }

    println!();
    println!("extension aliases:");
    for (alias, canonical) in EXTENSION_ALIASES {
        println!("  {} -> {}", alias, canonical);
    }

    println!();
    println!("mime aliases:");
    for (alias, (ext, mime)) in ALIAS_MIME_TO_CANONICAL {
        println!("  {} -> {} ({})", alias, ext, mime);
    }
}
