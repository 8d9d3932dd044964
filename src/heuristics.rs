//! Text heuristics for content without a binary signature.
//!
//! Classification is an ordered, short-circuiting pipeline. The order encodes
//! priority between competing guesses; for example a JSON-shaped Markdown
//! file is Markdown only if JSON parsing fails first.
//!
//! ```text
//! text gate ─▶ filename rescue ─▶ code ─▶ JSON ─▶ NDJSON ─▶ HTML
//!          ─▶ CSV/TSV ─▶ Markdown ─▶ TeX ─▶ plain text
//! ```
//!
//! Code detection is closed over eleven languages; no other source language
//! is ever inferred from content.

use std::collections::HashMap;

use tracing::debug;

use crate::delimited::count_fields;
use crate::formats::{canonical_mime_for, extension_of, is_supported_extension};
use crate::models::DetectedType;

/// Bytes decoded for heuristics.
const SAMPLE_BYTES: usize = 64 * 1024;
/// Minimum share of printable-or-whitespace characters for text.
const MIN_PRINTABLE_RATIO: f64 = 0.95;
/// Above this size JSON is checked by delimiters instead of a full parse.
const JSON_FULL_PARSE_LIMIT: usize = 8 * 1024 * 1024;
/// Non-blank lines sampled for delimiter consistency.
const TABULAR_SAMPLE_LINES: usize = 20;
/// Non-blank lines sampled for NDJSON.
const NDJSON_SAMPLE_LINES: usize = 50;
/// Minimum number of matched keyword cues to call content code.
const CODE_SCORE_THRESHOLD: usize = 2;

/// Source extensions that content-based code detection may return.
pub const CODE_EXTENSIONS: &[&str] = &[
    ".py", ".js", ".ts", ".java", ".c", ".cpp", ".cs", ".rb", ".php", ".go", ".sh",
];

/// Non-code extensions a filename may vouch for.
const RESCUABLE_TEXT_EXTENSIONS: &[&str] = &[".json", ".tex", ".csv", ".tsv"];

/// Keyword cues per language. Order breaks ties.
const KEYWORD_CUES: &[(&str, &[&str])] = &[
    (
        ".ts",
        &["interface ", "type ", "enum ", "readonly ", "implements ", " as const"],
    ),
    (
        ".js",
        &["function ", "=>", "const ", "let ", "export ", "import ", "console.log("],
    ),
    (".py", &["def ", "from ", "import ", "class ", "__name__", "elif "]),
    (
        ".java",
        &["package ", "public class ", "class ", "public static void main", "System.out."],
    ),
    (".cpp", &["#include", "std::", "using namespace", "template<", "cout <<"]),
    (".c", &["#include", "int main(", "printf(", "malloc("]),
    (
        ".cs",
        &["using System", "namespace ", "Console.WriteLine", "public class "],
    ),
    (".go", &["package ", "func ", "fmt.", "import (", "go func("]),
    (".rb", &["def ", "\nend\n", "class ", "module ", "puts ", "require '"]),
    (".sh", &["#!/bin/sh", "#!/bin/bash", "\nif [", "\nfi", "echo ", "\ndone"]),
    (".php", &["<?php", "$this->", "echo $", "function __construct"]),
];

/// Classifies text-like content. Never fails; non-text yields generic binary.
pub fn classify_text(content: &[u8], original_name: Option<&str>) -> DetectedType {
    if !looks_like_text(content) {
        return DetectedType::generic_binary("fallback:binary");
    }
    let sample = &content[..content.len().min(SAMPLE_BYTES)];
    let text = String::from_utf8_lossy(sample);

    if let Some(ext) = original_name.and_then(rescuable_name_extension) {
        debug!(ext = %ext, "text rescued by filename");
        return typed(&ext, &format!("rescue-by-name:{}", ext));
    }
    if let Some(ext) = guess_code_extension(&text) {
        debug!(ext = %ext, "code detected");
        return typed(ext, "heuristic:code");
    }
    if is_json(content) {
        return typed(".json", "heuristic:json");
    }
    if is_ndjson(&text) {
        return DetectedType::generic_binary("heuristic:ndjson");
    }
    if is_html(&text) {
        return typed(".html", "heuristic:html");
    }
    if let Some(ext) = guess_delimited(&text) {
        return typed(ext, &format!("heuristic:{}", &ext[1..]));
    }
    if is_markdown(&text) {
        return typed(".md", "heuristic:md");
    }
    if is_tex(&text) {
        return typed(".tex", "heuristic:tex");
    }
    typed(".txt", "heuristic:txt")
}

fn typed(ext: &str, reason: &str) -> DetectedType {
    match canonical_mime_for(ext) {
        Some(mime) => DetectedType::new(ext, mime, reason),
        None => DetectedType::generic_binary(reason),
    }
}

/// No NUL byte, and at least 95% of the decoded sample printable or whitespace.
/// Empty content counts as text.
pub fn looks_like_text(content: &[u8]) -> bool {
    if content.is_empty() {
        return true;
    }
    let sample = &content[..content.len().min(SAMPLE_BYTES)];
    if sample.contains(&0) {
        return false;
    }
    // Undecodable bytes are dropped rather than counted against the sample.
    let text = String::from_utf8_lossy(sample);
    let mut total = 0usize;
    let mut printable = 0usize;
    for ch in text.chars().filter(|&c| c != char::REPLACEMENT_CHARACTER) {
        total += 1;
        if ch.is_whitespace() || !ch.is_control() {
            printable += 1;
        }
    }
    total > 0 && (printable as f64 / total as f64) >= MIN_PRINTABLE_RATIO
}

fn rescuable_name_extension(name: &str) -> Option<String> {
    let ext = extension_of(name)?;
    let allowed = CODE_EXTENSIONS.contains(&ext.as_str())
        || RESCUABLE_TEXT_EXTENSIONS.contains(&ext.as_str());
    (allowed && is_supported_extension(&ext)).then_some(ext)
}

/// Shebang, then `<?php`, then keyword scoring with a threshold.
pub fn guess_code_extension(text: &str) -> Option<&'static str> {
    let first_line = text.lines().next().unwrap_or("");
    if let Some(ext) = shebang_extension(first_line) {
        return Some(ext);
    }
    if text.contains("<?php") {
        return Some(".php");
    }

    let mut best: Option<(&'static str, usize)> = None;
    for &(ext, cues) in KEYWORD_CUES {
        let score = cues.iter().filter(|cue| text.contains(*cue)).count();
        if best.map(|(_, s)| score > s).unwrap_or(true) {
            best = Some((ext, score));
        }
    }
    best.filter(|(_, score)| *score >= CODE_SCORE_THRESHOLD)
        .map(|(ext, _)| ext)
}

fn shebang_extension(first_line: &str) -> Option<&'static str> {
    let rest = first_line.strip_prefix("#!")?.trim();
    let mut words = rest.split_whitespace();
    let mut program = words.next()?.rsplit('/').next()?;
    if program == "env" {
        program = words.find(|w| !w.starts_with('-'))?;
    }
    let interpreter = program.trim_end_matches(|c: char| c.is_ascii_digit() || c == '.');
    match interpreter {
        "python" | "pypy" => Some(".py"),
        "node" | "nodejs" | "deno" => Some(".js"),
        "bash" | "sh" | "dash" | "zsh" | "ksh" => Some(".sh"),
        "php" => Some(".php"),
        "ruby" | "jruby" => Some(".rb"),
        "go" | "gorun" => Some(".go"),
        _ => None,
    }
}

/// A top-level JSON object or array. Large documents get a delimiter check.
pub fn is_json(content: &[u8]) -> bool {
    let trimmed = content.trim_ascii();
    let (Some(&open), Some(&close)) = (trimmed.first(), trimmed.last()) else {
        return false;
    };
    let paired = matches!((open, close), (b'{', b'}') | (b'[', b']'));
    if !paired {
        return false;
    }
    if trimmed.len() > JSON_FULL_PARSE_LIMIT {
        return true;
    }
    serde_json::from_slice::<serde::de::IgnoredAny>(trimmed).is_ok()
}

/// Several lines, most of them standalone JSON objects or arrays.
pub fn is_ndjson(text: &str) -> bool {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .take(NDJSON_SAMPLE_LINES)
        .collect();
    if lines.len() < 2 {
        return false;
    }
    let json_lines = lines.iter().filter(|l| is_json(l.as_bytes())).count();
    json_lines * 2 > lines.len()
}

fn is_html(text: &str) -> bool {
    let low = text.to_lowercase();
    ["<!doctype html", "<html", "<head", "<body"]
        .iter()
        .any(|tok| low.contains(tok))
}

/// CSV or TSV when one delimiter splits the sampled lines consistently.
pub fn guess_delimited(text: &str) -> Option<&'static str> {
    let lines: Vec<&str> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(TABULAR_SAMPLE_LINES)
        .collect();
    if lines.len() < 2 {
        return None;
    }
    let comma = DelimiterFit::measure(&lines, ',');
    let tab = DelimiterFit::measure(&lines, '\t');
    match (comma, tab) {
        (Some(c), Some(t)) => Some(if t.better_than(&c) { ".tsv" } else { ".csv" }),
        (Some(_), None) => Some(".csv"),
        (None, Some(_)) => Some(".tsv"),
        (None, None) => None,
    }
}

struct DelimiterFit {
    /// Lines whose field count equals the most common count.
    modal_lines: usize,
    distinct: usize,
}

impl DelimiterFit {
    fn measure(lines: &[&str], delim: char) -> Option<Self> {
        let mut freq: HashMap<usize, usize> = HashMap::new();
        for line in lines {
            *freq.entry(count_fields(line, delim)).or_default() += 1;
        }
        let (modal_count, modal_lines) = freq
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map(|(count, lines)| (*count, *lines))?;
        let fit = Self {
            modal_lines,
            distinct: freq.len(),
        };
        (fit.distinct <= 3 && modal_count > 1).then_some(fit)
    }

    fn better_than(&self, other: &Self) -> bool {
        (self.modal_lines, std::cmp::Reverse(self.distinct))
            > (other.modal_lines, std::cmp::Reverse(other.distinct))
    }
}

fn is_markdown(text: &str) -> bool {
    if text.contains("```") {
        return true;
    }
    text.lines().any(|line| is_atx_heading(line) || is_table_separator(line))
}

fn is_atx_heading(line: &str) -> bool {
    let hashes = line.chars().take_while(|&c| c == '#').count();
    (1..=6).contains(&hashes) && line[hashes..].starts_with(' ')
}

fn is_table_separator(line: &str) -> bool {
    let t = line.trim();
    t.starts_with('|')
        && t.contains("---")
        && t.chars().all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

fn is_tex(text: &str) -> bool {
    ["\\documentclass", "\\begin{document}", "\\usepackage"]
        .iter()
        .any(|tok| text.contains(tok))
}
