//! Binary signature scanning.
//!
//! Recognizes content by its leading magic bytes. ZIP containers are opened
//! and sniffed for OOXML parts; OLE compound files are disambiguated into
//! legacy Word/Excel/PowerPoint via the filename hint or the names stored in
//! the compound-file directory.

use std::io::Cursor;

use tracing::debug;

use crate::formats::{canonical_mime_for, extension_of, MIME_OLE, MIME_ZIP};
use crate::models::DetectedType;

const PDF_SIG: &[u8] = b"%PDF-";
const PNG_SIG: &[u8] = b"\x89PNG\r\n\x1a\n";
const JPEG_SIG: &[u8] = b"\xff\xd8\xff";
const OLE_CFB_SIG: &[u8] = b"\xd0\xcf\x11\xe0\xa1\xb1\x1a\xe1";
const ZIP_SIG: &[u8] = b"PK\x03\x04";
const ZIP_EMPTY_SIG: &[u8] = b"PK\x05\x06";

/// OOXML parts in priority order: first present entry wins.
const OOXML_PARTS: &[(&str, &str, &str)] = &[
    ("xl/workbook.xml", ".xlsx", "xl/"),
    ("word/document.xml", ".docx", "word/"),
    ("ppt/presentation.xml", ".pptx", "ppt/"),
];

/// Directory entry names that identify a legacy Office compound file.
const OLE_STREAMS: &[(&str, &str)] = &[
    ("WordDocument", ".doc"),
    ("Workbook", ".xls"),
    ("Book", ".xls"),
    ("PowerPoint Document", ".ppt"),
];

// Compound File Binary layout.
const CFB_SECTOR_SHIFT_AT: usize = 30;
const CFB_FIRST_DIR_SECTOR_AT: usize = 48;
const CFB_DIFAT_AT: usize = 76;
const CFB_HEADER_DIFAT_LEN: usize = 109;
const CFB_MAX_REG_SECT: u32 = 0xFFFF_FFFA;
const CFB_DIR_ENTRY_LEN: usize = 128;
const CFB_ENTRY_NAME_LEN_AT: usize = 64;
/// Bytes reserved for the UTF-16LE name, terminator included.
const CFB_ENTRY_NAME_MAX: usize = 64;
const CFB_ENTRY_TYPE_AT: usize = 66;
const CFB_STREAM_ENTRY: u8 = 2;
/// Directory sectors followed before giving up on a cyclic chain.
const CFB_MAX_DIR_SECTORS: usize = 4096;

const LEGACY_OFFICE: &[&str] = &[".doc", ".xls", ".ppt"];
const OOXML_EXTS: &[&str] = &[".docx", ".xlsx", ".pptx"];

/// Classifies content by binary signature. `None` means "not a known binary
/// format": callers fall through to text heuristics.
pub fn scan(content: &[u8], original_name: Option<&str>) -> Option<DetectedType> {
    if content.starts_with(PDF_SIG) {
        return Some(known(".pdf", "sig:pdf"));
    }
    if content.starts_with(PNG_SIG) {
        return Some(known(".png", "sig:png"));
    }
    if content.starts_with(JPEG_SIG) {
        return Some(known(".jpg", "sig:jpeg"));
    }
    if content.starts_with(OLE_CFB_SIG) {
        return Some(scan_ole(content, original_name));
    }
    if content.starts_with(ZIP_SIG) || content.starts_with(ZIP_EMPTY_SIG) {
        return Some(scan_zip(content, original_name));
    }
    None
}

fn known(ext: &str, reason: &str) -> DetectedType {
    let mime = canonical_mime_for(ext).unwrap_or(crate::formats::GENERIC_BINARY_MIME);
    DetectedType::new(ext, mime, reason)
}

fn scan_ole(content: &[u8], original_name: Option<&str>) -> DetectedType {
    if let Some(ext) = original_name.and_then(extension_of) {
        if LEGACY_OFFICE.contains(&ext.as_str()) {
            return known(&ext, &format!("sig:ole+name{}", ext));
        }
    }
    if let Some(ext) = match_ole_streams(content) {
        debug!(ext = %ext, "OLE stream name matched");
        return known(ext, &format!("sig:ole+stream{}", ext));
    }
    DetectedType::new(".ole", MIME_OLE, "sig:ole")
}

/// Matches well-known stream names from the compound-file directory.
fn match_ole_streams(content: &[u8]) -> Option<&'static str> {
    let names = ole_stream_names(content);
    OLE_STREAMS
        .iter()
        .find(|(stream, _)| names.iter().any(|n| n.as_str() == *stream))
        .map(|(_, ext)| *ext)
}

fn read_u16(buf: &[u8], at: usize) -> Option<u16> {
    let b = buf.get(at..at.checked_add(2)?)?;
    Some(u16::from_le_bytes([b[0], b[1]]))
}

fn read_u32(buf: &[u8], at: usize) -> Option<u32> {
    let b = buf.get(at..at.checked_add(4)?)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Names of the stream entries in a compound file's directory.
///
/// The directory chain starts at the sector named in the header and is
/// followed through the allocation table, whose sectors are listed in the
/// header's DIFAT array. Truncated or malformed files yield whatever was
/// read before the first bad reference.
fn ole_stream_names(content: &[u8]) -> Vec<String> {
    let mut names = Vec::new();
    let sector_len = match read_u16(content, CFB_SECTOR_SHIFT_AT) {
        Some(shift @ (9 | 12)) => 1usize << shift,
        _ => return names,
    };
    let sector = |sid: u32| -> Option<&[u8]> {
        let start = (sid as usize).checked_add(1)?.checked_mul(sector_len)?;
        content.get(start..start.checked_add(sector_len)?)
    };
    let fat_sectors: Vec<u32> = (0..CFB_HEADER_DIFAT_LEN)
        .filter_map(|i| read_u32(content, CFB_DIFAT_AT + i * 4))
        .take_while(|&sid| sid <= CFB_MAX_REG_SECT)
        .collect();
    let next = |sid: u32| -> Option<u32> {
        let per_sector = sector_len / 4;
        let fat_sid = *fat_sectors.get(sid as usize / per_sector)?;
        read_u32(sector(fat_sid)?, (sid as usize % per_sector) * 4)
    };

    let mut sid = read_u32(content, CFB_FIRST_DIR_SECTOR_AT);
    for _ in 0..CFB_MAX_DIR_SECTORS {
        let Some(dir) = sid.filter(|&s| s <= CFB_MAX_REG_SECT).and_then(sector) else {
            break;
        };
        for entry in dir.chunks_exact(CFB_DIR_ENTRY_LEN) {
            if entry[CFB_ENTRY_TYPE_AT] != CFB_STREAM_ENTRY {
                continue;
            }
            // Byte length including the terminating NUL.
            let len = read_u16(entry, CFB_ENTRY_NAME_LEN_AT).unwrap_or(0) as usize;
            if !(2..=CFB_ENTRY_NAME_MAX).contains(&len) || len % 2 != 0 {
                continue;
            }
            let units: Vec<u16> = entry[..len - 2]
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect();
            names.push(String::from_utf16_lossy(&units));
        }
        sid = sid.and_then(next);
    }
    names
}

fn scan_zip(content: &[u8], original_name: Option<&str>) -> DetectedType {
    if let Some(detected) = sniff_ooxml(content) {
        return detected;
    }
    if let Some(ext) = original_name.and_then(extension_of) {
        if OOXML_EXTS.contains(&ext.as_str()) {
            debug!(ext = %ext, "zip rescued by filename");
            return known(&ext, &format!("sig:zip+rescue-by-name{}", ext));
        }
    }
    DetectedType::new(".zip", MIME_ZIP, "sig:zip")
}

/// Opens the buffer as a ZIP archive and checks for OOXML main parts.
/// Corrupt archives are treated as "not OOXML".
pub fn sniff_ooxml(content: &[u8]) -> Option<DetectedType> {
    let archive = match zip::ZipArchive::new(Cursor::new(content)) {
        Ok(a) => a,
        Err(e) => {
            debug!(error = %e, "OOXML sniff: not a readable archive");
            return None;
        }
    };
    let names: Vec<&str> = archive.file_names().collect();
    OOXML_PARTS.iter().find_map(|(part, ext, marker)| {
        names.contains(part).then(|| {
            debug!(part = %part, "OOXML sniff matched");
            known(ext, &format!("zip+ooxml:{}", &ext[1..])).with_marker(*marker)
        })
    })
}
