//! Support enforcement: the last step of every detection path.
//!
//! Whatever a strategy produced, the pair leaving the detector is one of the
//! registry's canonical pairs. Unsupported halves are repaired from the
//! supported half, then from the original filename, and otherwise the
//! result degrades to generic binary.

use tracing::debug;

use crate::formats::{
    canonical_mime_for, extension_for_mime, extension_of, is_canonical_pair,
    is_supported_extension, is_supported_mime, normalize_extension, normalize_mime,
    resolve_alias,
};
use crate::models::DetectedType;

/// Replaces an alias MIME with its canonical pair, keeping reason and marker.
pub fn normalize_alias(detected: DetectedType) -> DetectedType {
    match resolve_alias(&detected.mime) {
        Some((ext, mime)) => DetectedType {
            extension: ext.to_string(),
            mime: mime.to_string(),
            reason: format!("{}+alias", detected.reason),
            ..detected
        },
        None => detected,
    }
}

/// Forces `detected` onto a canonical supported pair.
pub fn enforce(detected: DetectedType, original_name: Option<&str>) -> DetectedType {
    let ext = normalize_extension(&detected.extension).unwrap_or_default();
    let mime = normalize_mime(&detected.mime);
    let ext_ok = is_supported_extension(&ext);
    let mime_ok = is_supported_mime(&mime);

    match (ext_ok, mime_ok) {
        (true, true) if is_canonical_pair(&ext, &mime) => DetectedType {
            extension: ext,
            mime,
            ..detected
        },
        (true, _) => match canonical_mime_for(&ext) {
            Some(canonical) => {
                debug!(ext = %ext, from = %mime, to = canonical, "mime replaced by canonical");
                DetectedType {
                    extension: ext,
                    mime: canonical.to_string(),
                    reason: format!("{}+enforce:mime", detected.reason),
                    ..detected
                }
            }
            None => DetectedType::generic_binary(format!("{}+enforce:degrade", detected.reason)),
        },
        (false, true) => match extension_for_mime(&mime) {
            Some(canonical) => DetectedType {
                extension: canonical.to_string(),
                mime,
                reason: format!("{}+enforce:ext", detected.reason),
                ..detected
            },
            None => DetectedType::generic_binary(format!("{}+enforce:degrade", detected.reason)),
        },
        (false, false) => {
            if let Some((e, m)) = resolve_alias(&mime) {
                return DetectedType {
                    extension: e.to_string(),
                    mime: m.to_string(),
                    reason: format!("{}+enforce:alias", detected.reason),
                    ..detected
                };
            }
            rescue_by_name(&detected, original_name).unwrap_or_else(|| {
                debug!(ext = %ext, mime = %mime, "unsupported pair degraded to binary");
                DetectedType::generic_binary(format!("{}+enforce:degrade", detected.reason))
            })
        }
    }
}

fn rescue_by_name(detected: &DetectedType, original_name: Option<&str>) -> Option<DetectedType> {
    let ext = extension_of(original_name?)?;
    if !is_supported_extension(&ext) {
        return None;
    }
    let mime = canonical_mime_for(&ext).filter(|m| is_supported_mime(m))?;
    debug!(ext = %ext, "unsupported pair rescued by filename");
    Some(DetectedType::new(
        ext.clone(),
        mime,
        format!("{}+enforce:rescue-by-name:{}", detected.reason, ext),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn made_up() -> DetectedType {
        DetectedType::new(".xyz", "application/x-made-up", "test")
    }

    #[test]
    fn unsupported_pair_rescued_by_filename() {
        let dt = enforce(made_up(), Some("Report.PY"));
        assert_eq!((dt.extension.as_str(), dt.mime.as_str()), (".py", "text/x-python"));
        assert!(dt.reason.contains("rescue-by-name"));
    }

    #[test]
    fn unsupported_pair_without_name_degrades() {
        let dt = enforce(made_up(), None);
        assert_eq!((dt.extension.as_str(), dt.mime.as_str()), (".bin", "application/octet-stream"));
        let dt = enforce(made_up(), Some("archive.rar"));
        assert!(dt.is_generic_binary());
    }

    #[test]
    fn supported_pair_is_unchanged() {
        let dt = enforce(DetectedType::new(".pdf", "application/pdf", "sig:pdf"), None);
        assert_eq!(dt.extension, ".pdf");
        assert_eq!(dt.reason, "sig:pdf");
    }

    #[test]
    fn supported_extension_gets_canonical_mime() {
        let dt = enforce(DetectedType::new(".md", "text/x-unknown", "x"), None);
        assert_eq!(dt.mime, "text/markdown");
        let dt = enforce(DetectedType::new(".py", "text/plain", "x"), None);
        assert_eq!(dt.mime, "text/x-python");
    }

    #[test]
    fn supported_mime_gets_canonical_extension() {
        let dt = enforce(DetectedType::new(".yaml", "text/plain", "x"), None);
        assert_eq!(dt.extension, ".txt");
        let dt = enforce(DetectedType::new(".mjs", "application/x-javascript", "x"), None);
        assert_eq!(dt.extension, ".js");
        assert_eq!(dt.mime, "text/javascript");
    }

    #[test]
    fn alias_mime_normalized() {
        let dt = normalize_alias(DetectedType::new(".pdf", "application/x-pdf", "lib"));
        assert_eq!(dt.mime, "application/pdf");
        assert_eq!(dt.reason, "lib+alias");
    }

    #[test]
    fn extension_alias_and_case_are_folded() {
        let dt = enforce(DetectedType::new(".JPEG", "Image/JPEG", "x"), None);
        assert_eq!((dt.extension.as_str(), dt.mime.as_str()), (".jpg", "image/jpeg"));
    }

    #[test]
    fn marker_survives_enforcement() {
        let dt = DetectedType::new(".docx", crate::formats::MIME_DOCX, "zip+ooxml:docx")
            .with_marker("word/");
        assert_eq!(enforce(dt, None).archive_inner_marker.as_deref(), Some("word/"));
    }
}
