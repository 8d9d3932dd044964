//! Tabular sources rendered as Markdown tables.
//!
//! CSV/TSV files are decoded as UTF-8 (Latin-1 on failure), split with a
//! sniffed delimiter, and rendered as one table. XLSX workbooks are read
//! directly from their ZIP parts (`xl/workbook.xml`, its relationships,
//! `xl/sharedStrings.xml`, and each worksheet) and rendered one table per
//! sheet. The first row of every table is its header.
//!
//! Large tables are split into `__partN` files of at most
//! `max_rows_per_md` data rows, each repeating the header. Columns beyond
//! `max_cols` are dropped.

use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesStart, Event};
use tracing::{debug, warn};

use crate::delimited::{parse_records, sniff_delimiter};
use crate::error::TabularError;
use crate::naming::sanitize_component;

/// Maximum sheets rendered from one workbook.
const XLSX_MAX_SHEETS: usize = 100;
/// Cells read per sheet before the rest is dropped.
const XLSX_MAX_CELLS_PER_SHEET: usize = 1_000_000;
/// Columns in the XLSX format (`A` through `XFD`).
const XLSX_MAX_COLUMNS: usize = 16_384;
/// Decompressed size limit for one workbook part.
const MAX_XML_ENTRY_BYTES: u64 = 64 * 1024 * 1024;

type Rows = Vec<Vec<String>>;

#[derive(Debug, Clone, Copy)]
pub struct MarkdownLimits {
    pub max_rows_per_md: usize,
    pub max_cols: usize,
}

/// One worksheet: display name and its rows, header first.
#[derive(Debug)]
pub struct Sheet {
    pub name: String,
    pub rows: Rows,
}

// ═══════════════════════════════════════════════════════════════════════
// Staging entry points
// ═══════════════════════════════════════════════════════════════════════

/// Renders a CSV/TSV file into `out_dir` as `<stem>.md` (or `__partN` files).
pub fn delimited_to_markdown(
    src: &Path,
    out_dir: &Path,
    limits: MarkdownLimits,
) -> Result<Vec<PathBuf>, TabularError> {
    let rows = read_delimited(src)?;
    let heading = format!("# {}", display_name(src));
    write_markdown_parts(out_dir, &stem_of(src), &heading, &rows, limits)
}

/// Renders each worksheet of an XLSX file into `out_dir` as
/// `<stem>__<sheet>.md` (or `__partN` files).
pub fn xlsx_to_markdown(
    src: &Path,
    out_dir: &Path,
    limits: MarkdownLimits,
) -> Result<Vec<PathBuf>, TabularError> {
    let bytes = std::fs::read(src)?;
    let sheets = read_xlsx(&bytes, limits.max_cols)?;
    let stem = stem_of(src);
    let mut outputs = Vec::new();
    for sheet in sheets {
        let heading = format!("# {} — Sheet: {}", display_name(src), sheet.name);
        let base = format!("{}__{}", stem, sanitize_component(&sheet.name));
        outputs.extend(write_markdown_parts(out_dir, &base, &heading, &sheet.rows, limits)?);
    }
    Ok(outputs)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn stem_of(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    sanitize_component(&stem)
}

// ═══════════════════════════════════════════════════════════════════════
// Delimited text
// ═══════════════════════════════════════════════════════════════════════

/// Reads a delimited file into rows padded to a common width.
pub fn read_delimited(path: &Path) -> Result<Rows, TabularError> {
    let bytes = std::fs::read(path)?;
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            debug!(path = %path.display(), "not UTF-8, decoding as Latin-1");
            e.into_bytes().iter().map(|&b| b as char).collect()
        }
    };
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
    let delim = sniff_delimiter(text);
    Ok(pad_rows(parse_records(text, delim)))
}

fn pad_rows(mut rows: Rows) -> Rows {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    for row in &mut rows {
        row.resize(width, String::new());
    }
    rows
}

// ═══════════════════════════════════════════════════════════════════════
// XLSX
// ═══════════════════════════════════════════════════════════════════════

type Archive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

/// Reads every worksheet of an XLSX workbook, in workbook order. Cells at
/// or beyond column `max_cols` (or the format's 16384-column limit) are
/// dropped while reading.
pub fn read_xlsx(bytes: &[u8], max_cols: usize) -> Result<Vec<Sheet>, TabularError> {
    let col_limit = max_cols.min(XLSX_MAX_COLUMNS);
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let shared_strings = if archive.index_for_name("xl/sharedStrings.xml").is_some() {
        let xml = read_zip_entry_bounded(&mut archive, "xl/sharedStrings.xml")?;
        read_shared_strings(&xml)?
    } else {
        Vec::new()
    };

    let parts = list_sheets(&mut archive)?;
    if parts.is_empty() {
        return Err(TabularError::NoSheets);
    }
    if parts.len() > XLSX_MAX_SHEETS {
        warn!(sheets = parts.len(), max = XLSX_MAX_SHEETS, "workbook truncated");
    }

    let mut sheets = Vec::new();
    for (name, part) in parts.into_iter().take(XLSX_MAX_SHEETS) {
        if archive.index_for_name(&part).is_none() {
            warn!(sheet = %name, part = %part, "worksheet part missing");
            continue;
        }
        let xml = read_zip_entry_bounded(&mut archive, &part)?;
        let rows = read_sheet_rows(&xml, &shared_strings, col_limit)?;
        sheets.push(Sheet { name, rows });
    }
    Ok(sheets)
}

fn read_zip_entry_bounded(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>, TabularError> {
    let entry = archive.by_name(name)?;
    let mut out = Vec::new();
    entry.take(MAX_XML_ENTRY_BYTES).read_to_end(&mut out)?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(TabularError::EntryTooLarge {
            part: name.to_string(),
            limit: MAX_XML_ENTRY_BYTES,
        });
    }
    Ok(out)
}

fn attr(e: &BytesStart<'_>, local: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == local)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// `(sheet name, part path)` pairs from the workbook and its relationships.
/// Falls back to numbered `xl/worksheets/sheetN.xml` parts.
fn list_sheets(archive: &mut Archive<'_>) -> Result<Vec<(String, String)>, TabularError> {
    let mut declared: Vec<(String, String)> = Vec::new();
    if archive.index_for_name("xl/workbook.xml").is_some() {
        let xml = read_zip_entry_bounded(archive, "xl/workbook.xml")?;
        let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                    if let (Some(name), Some(rid)) = (attr(&e, b"name"), attr(&e, b"id")) {
                        declared.push((name, rid));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
    }

    let targets = if archive.index_for_name("xl/_rels/workbook.xml.rels").is_some() {
        let xml = read_zip_entry_bounded(archive, "xl/_rels/workbook.xml.rels")?;
        read_relationships(&xml)?
    } else {
        HashMap::new()
    };

    let resolved: Vec<(String, String)> = declared
        .into_iter()
        .filter_map(|(name, rid)| targets.get(&rid).map(|part| (name, part.clone())))
        .collect();
    if !resolved.is_empty() {
        return Ok(resolved);
    }

    let mut numbered: Vec<(u32, String)> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(|n| {
            let idx = n
                .trim_start_matches("xl/worksheets/sheet")
                .trim_end_matches(".xml")
                .parse::<u32>()
                .unwrap_or(u32::MAX);
            (idx, n.to_string())
        })
        .collect();
    numbered.sort();
    Ok(numbered
        .into_iter()
        .enumerate()
        .map(|(i, (_, part))| (format!("Sheet{}", i + 1), part))
        .collect())
}

/// Relationship id → part path under `xl/`.
fn read_relationships(xml: &[u8]) -> Result<HashMap<String, String>, TabularError> {
    let mut targets = HashMap::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                if let (Some(id), Some(target)) = (attr(&e, b"Id"), attr(&e, b"Target")) {
                    let part = match target.strip_prefix('/') {
                        Some(absolute) => absolute.to_string(),
                        None => format!("xl/{}", target),
                    };
                    targets.insert(id, part);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(targets)
}

/// Shared string table. Rich-text runs inside one `<si>` are concatenated;
/// phonetic hints (`<rPh>`) are skipped.
fn read_shared_strings(xml: &[u8]) -> Result<Vec<String>, TabularError> {
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut current = String::new();
    let mut in_t = false;
    let mut in_phonetic = false;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"rPh" => in_phonetic = true,
                b"t" => in_t = !in_phonetic,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::Text(te) if in_t => {
                current.push_str(&te.unescape().unwrap_or_default());
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"rPh" => in_phonetic = false,
                b"si" => strings.push(std::mem::take(&mut current)),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Zero-based column index from a cell reference such as `AB12`.
fn column_index(cell_ref: &str) -> Option<usize> {
    let letters: Vec<u8> = cell_ref
        .bytes()
        .take_while(u8::is_ascii_alphabetic)
        .map(|b| b.to_ascii_uppercase())
        .collect();
    if letters.is_empty() {
        return None;
    }
    let mut idx = 0usize;
    for b in letters {
        idx = idx.checked_mul(26)?.checked_add((b - b'A' + 1) as usize)?;
    }
    Some(idx - 1)
}

#[derive(Default)]
struct CellState {
    col: usize,
    kind: Option<String>,
    value: String,
}

fn read_sheet_rows(
    xml: &[u8],
    shared_strings: &[String],
    col_limit: usize,
) -> Result<Rows, TabularError> {
    let mut grid: BTreeMap<usize, BTreeMap<usize, String>> = BTreeMap::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();

    let mut row_idx = 0usize;
    let mut next_col = 0usize;
    let mut cell: Option<CellState> = None;
    let mut in_value = false;
    let mut cells = 0usize;
    let mut dropped = 0usize;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"row" => {
                    row_idx = attr(&e, b"r")
                        .and_then(|r| r.parse::<usize>().ok())
                        .map(|r| r.saturating_sub(1))
                        .unwrap_or(row_idx);
                    next_col = 0;
                }
                b"c" => {
                    let col = attr(&e, b"r")
                        .and_then(|r| column_index(&r))
                        .unwrap_or(next_col);
                    cell = Some(CellState {
                        col,
                        kind: attr(&e, b"t"),
                        value: String::new(),
                    });
                }
                b"v" | b"t" if cell.is_some() => in_value = true,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                next_col = attr(&e, b"r")
                    .and_then(|r| column_index(&r))
                    .unwrap_or(next_col)
                    + 1;
            }
            Event::Text(te) if in_value => {
                if let Some(c) = cell.as_mut() {
                    c.value.push_str(&te.unescape().unwrap_or_default());
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    if let Some(c) = cell.take() {
                        next_col = c.col + 1;
                        let text = cell_text(&c, shared_strings);
                        if c.col >= col_limit {
                            dropped += 1;
                        } else if !text.is_empty() {
                            grid.entry(row_idx).or_default().insert(c.col, text);
                            cells += 1;
                        }
                    }
                }
                b"row" => row_idx += 1,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
        if cells >= XLSX_MAX_CELLS_PER_SHEET {
            warn!(max = XLSX_MAX_CELLS_PER_SHEET, "sheet truncated");
            break;
        }
    }

    if dropped > 0 {
        warn!(cells = dropped, max_cols = col_limit, "cells beyond column limit dropped");
    }

    let width = grid
        .values()
        .filter_map(|row| row.keys().next_back())
        .max()
        .map(|last| last + 1)
        .unwrap_or(0);
    Ok(grid
        .into_values()
        .map(|row| {
            let mut out = vec![String::new(); width];
            for (col, text) in row {
                out[col] = text;
            }
            out
        })
        .collect())
}

fn cell_text(cell: &CellState, shared_strings: &[String]) -> String {
    let raw = cell.value.trim();
    match cell.kind.as_deref() {
        Some("s") => raw
            .parse::<usize>()
            .ok()
            .and_then(|i| shared_strings.get(i))
            .cloned()
            .unwrap_or_default(),
        Some("b") => match raw {
            "1" => "TRUE".to_string(),
            "0" => "FALSE".to_string(),
            other => other.to_string(),
        },
        Some("inlineStr") | Some("str") => cell.value.clone(),
        _ => raw.to_string(),
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Markdown rendering
// ═══════════════════════════════════════════════════════════════════════

fn escape_cell(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('|', "\\|")
        .replace("\r\n", "<br>")
        .replace(['\n', '\r'], "<br>")
}

/// A pipe table with `rows[0]` as header, capped at `max_cols` columns.
pub fn render_table(header: &[String], body: &[Vec<String>], max_cols: usize) -> String {
    let cols = header.len().min(max_cols);
    if cols == 0 {
        return String::new();
    }
    let line = |row: &[String]| {
        let cells: Vec<String> = (0..cols)
            .map(|i| escape_cell(row.get(i).map(String::as_str).unwrap_or("")))
            .collect();
        format!("| {} |", cells.join(" | "))
    };
    let mut out = String::new();
    out.push_str(&line(header));
    out.push('\n');
    out.push_str(&format!("|{}", " --- |".repeat(cols)));
    out.push('\n');
    for row in body {
        out.push_str(&line(row));
        out.push('\n');
    }
    out
}

/// Writes `rows` as one or more Markdown files named after `base`.
pub fn write_markdown_parts(
    out_dir: &Path,
    base: &str,
    heading: &str,
    rows: &[Vec<String>],
    limits: MarkdownLimits,
) -> Result<Vec<PathBuf>, TabularError> {
    std::fs::create_dir_all(out_dir)?;
    let (header, body): (&[String], &[Vec<String>]) = match rows.split_first() {
        Some((h, b)) => (h.as_slice(), b),
        None => (&[], &[]),
    };

    let per_part = limits.max_rows_per_md.max(1);
    let chunks: Vec<&[Vec<String>]> = if body.len() <= per_part {
        vec![body]
    } else {
        body.chunks(per_part).collect()
    };
    let split = chunks.len() > 1;

    let mut written = Vec::with_capacity(chunks.len());
    for (i, chunk) in chunks.into_iter().enumerate() {
        let name = if split {
            format!("{}__part{}.md", base, i + 1)
        } else {
            format!("{}.md", base)
        };
        let path = out_dir.join(name);
        let doc = format!("{}\n\n{}", heading, render_table(header, chunk, limits.max_cols));
        std::fs::write(&path, doc)?;
        debug!(path = %path.display(), rows = chunk.len(), "markdown written");
        written.push(path);
    }
    Ok(written)
}
