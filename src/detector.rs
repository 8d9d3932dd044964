//! Type detection orchestrator.
//!
//! A [`TypeDetector`] runs an ordered list of [`DetectionStrategy`] trait
//! objects over a byte buffer. The first strategy that returns a result wins;
//! if none do, the buffer is generic binary. Every path then goes through
//! alias normalization and [`enforce`](crate::enforce::enforce), so
//! [`TypeDetector::detect`] is total and always returns a canonical pair.
//!
//! ```text
//! bytes ─▶ InferStrategy ─▶ SignatureStrategy ─▶ TextStrategy ─▶ (generic binary)
//!                │                  │                   │                │
//!                └──────────── alias normalization ◀────┴────────────────┘
//!                                          │
//!                                       enforce
//! ```
//!
//! [`InferStrategy`] reports whatever MIME the `infer` matcher database
//! uses, which is often not the canonical one; the alias table folds
//! those onto the registry.

use tracing::debug;

use crate::enforce::{enforce, normalize_alias};
use crate::formats::normalize_extension;
use crate::heuristics::{classify_text, looks_like_text};
use crate::models::DetectedType;
use crate::signature;

/// Leading bytes handed to the `infer` matchers.
const INFER_SAMPLE_BYTES: usize = 8192;

/// Types whose real format depends on their parts or stream names.
const CONTAINER_EXTENSIONS: &[&str] =
    &[".zip", ".docx", ".xlsx", ".pptx", ".ole", ".doc", ".xls", ".ppt"];

/// One layer of the detection pipeline.
///
/// Strategies are pure functions of the content and the optional original
/// filename. Returning `None` passes the buffer to the next strategy.
pub trait DetectionStrategy: Send + Sync {
    /// Short name used in log output.
    fn name(&self) -> &'static str;

    fn detect(&self, content: &[u8], original_name: Option<&str>) -> Option<DetectedType>;
}

/// Content sniffing with the `infer` matcher database.
///
/// ZIP and OLE containers are declined so [`SignatureStrategy`] can inspect
/// their parts, and text matchers are declined in favor of the heuristics.
pub struct InferStrategy;

impl DetectionStrategy for InferStrategy {
    fn name(&self) -> &'static str {
        "infer"
    }

    fn detect(&self, content: &[u8], _original_name: Option<&str>) -> Option<DetectedType> {
        let sample = &content[..content.len().min(INFER_SAMPLE_BYTES)];
        let kind = infer::get(sample)?;
        if matches!(kind.matcher_type(), infer::MatcherType::Text) {
            return None;
        }
        library_candidate(kind.extension(), kind.mime_type(), "lib:infer")
    }
}

/// A raw library answer, or `None` when it names a container.
fn library_candidate(ext: &str, mime: &str, source: &str) -> Option<DetectedType> {
    let ext = normalize_extension(ext).unwrap_or_default();
    let reason = format!("{}:{}", source, ext.trim_start_matches('.'));
    let raw = DetectedType::new(ext.as_str(), mime, reason);
    let resolved = normalize_alias(raw.clone());
    let container = [raw.extension.as_str(), resolved.extension.as_str()]
        .iter()
        .any(|e| CONTAINER_EXTENSIONS.contains(e));
    (!container).then_some(raw)
}

/// Magic-number and container inspection.
pub struct SignatureStrategy;

impl DetectionStrategy for SignatureStrategy {
    fn name(&self) -> &'static str {
        "signature"
    }

    fn detect(&self, content: &[u8], original_name: Option<&str>) -> Option<DetectedType> {
        signature::scan(content, original_name)
    }
}

/// Text heuristics. Declines binary-looking content so later strategies
/// (or the generic fallback) can handle it.
pub struct TextStrategy;

impl DetectionStrategy for TextStrategy {
    fn name(&self) -> &'static str {
        "text"
    }

    fn detect(&self, content: &[u8], original_name: Option<&str>) -> Option<DetectedType> {
        if !looks_like_text(content) {
            return None;
        }
        Some(classify_text(content, original_name))
    }
}

pub struct TypeDetector {
    strategies: Vec<Box<dyn DetectionStrategy>>,
}

impl Default for TypeDetector {
    fn default() -> Self {
        Self::new(vec![
            Box::new(InferStrategy),
            Box::new(SignatureStrategy),
            Box::new(TextStrategy),
        ])
    }
}

impl TypeDetector {
    pub fn new(strategies: Vec<Box<dyn DetectionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Classifies `content`. Never fails.
    pub fn detect(&self, content: &[u8], original_name: Option<&str>) -> DetectedType {
        let found = self.strategies.iter().find_map(|strategy| {
            strategy.detect(content, original_name).map(|dt| {
                debug!(strategy = strategy.name(), detected = %dt, "strategy matched");
                dt
            })
        });
        let detected = found.unwrap_or_else(|| DetectedType::generic_binary("fallback:binary"));
        enforce(normalize_alias(detected), original_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::{is_canonical_pair, is_supported_extension, is_supported_mime};

    fn assert_canonical(dt: &DetectedType) {
        assert!(is_supported_extension(&dt.extension), "{}", dt);
        assert!(is_supported_mime(&dt.mime), "{}", dt);
        assert!(is_canonical_pair(&dt.extension, &dt.mime), "{}", dt);
    }

    /// Deterministic byte soup from a small LCG.
    fn noise(seed: u64, len: usize) -> Vec<u8> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                (state >> 33) as u8
            })
            .collect()
    }

    struct Fixed(&'static str, &'static str);

    impl DetectionStrategy for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }
        fn detect(&self, _: &[u8], _: Option<&str>) -> Option<DetectedType> {
            Some(DetectedType::new(self.0, self.1, "fixed"))
        }
    }

    #[test]
    fn detect_is_total_over_noise_and_truncation() {
        let detector = TypeDetector::default();
        let names = [None, Some("a.xyz"), Some("a.py"), Some("a.docx"), Some("")];
        for seed in 0..32u64 {
            for len in [0usize, 1, 3, 7, 64, 513, 4096] {
                for name in names {
                    assert_canonical(&detector.detect(&noise(seed, len), name));
                }
            }
        }
        let pdf = b"%PDF-1.4\n1 0 obj";
        for cut in 0..pdf.len() {
            assert_canonical(&detector.detect(&pdf[..cut], None));
        }
    }

    #[test]
    fn content_beats_misleading_name() {
        let dt = TypeDetector::default().detect(b"%PDF-1.7\n\xff\xfe", Some("notes.txt"));
        assert_eq!(dt.extension, ".pdf");
        assert_eq!(dt.reason, "lib:infer:pdf");

        let signature_only = TypeDetector::new(vec![Box::new(SignatureStrategy)]);
        let dt = signature_only.detect(b"%PDF-1.7\n\xff\xfe", Some("notes.txt"));
        assert_eq!(dt.reason, "sig:pdf");
    }

    #[test]
    fn infer_reports_images_and_skips_text() {
        let png = InferStrategy.detect(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR", None).unwrap();
        assert_eq!((png.extension.as_str(), png.mime.as_str()), (".png", "image/png"));
        assert!(InferStrategy.detect(b"#!/bin/sh\necho hi\n", None).is_none());
        assert!(InferStrategy.detect(b"plain words", None).is_none());
    }

    #[test]
    fn infer_leaves_containers_to_signature_scan() {
        let mut ole = b"\xd0\xcf\x11\xe0\xa1\xb1\x1a\xe1".to_vec();
        ole.resize(1024, 0);
        assert!(InferStrategy.detect(&ole, None).is_none());
        assert!(InferStrategy.detect(b"PK\x03\x04rest-of-archive", None).is_none());
    }

    #[test]
    fn library_alias_mimes_are_recognized_as_containers() {
        assert!(library_candidate("msi", "application/x-ole-storage", "lib:infer").is_none());
        assert!(library_candidate("bin", "application/x-zip-compressed", "lib:infer").is_none());
        let gif = library_candidate("gif", "image/gif", "lib:infer").unwrap();
        assert_eq!(gif.reason, "lib:infer:gif");
        assert!(TypeDetector::new(vec![Box::new(Fixed(".gif", "image/gif"))])
            .detect(b"GIF89a", None)
            .is_generic_binary());
    }

    #[test]
    fn library_jpeg_alias_folds_to_canonical() {
        let raw = library_candidate("jpeg", "image/pjpeg", "lib:infer").unwrap();
        let dt = enforce(normalize_alias(raw), None);
        assert_eq!((dt.extension.as_str(), dt.mime.as_str()), (".jpg", "image/jpeg"));
        assert_eq!(dt.reason, "lib:infer:jpg+alias");
    }

    #[test]
    fn ndjson_and_binary_degrade() {
        let detector = TypeDetector::default();
        assert!(detector.detect(b"{\"a\":1}\n{\"b\":2}\n", None).is_generic_binary());
        assert!(detector.detect(&[0u8, 1, 2, 3, 0, 0xff], None).is_generic_binary());
    }

    #[test]
    fn text_strategy_gates_on_content_not_reason() {
        assert!(TextStrategy.detect(&[0u8, 1, 2], Some("a.py")).is_none());
        let ndjson = TextStrategy.detect(b"{\"a\":1}\n{\"b\":2}\n", None).unwrap();
        assert_eq!(ndjson.reason, "heuristic:ndjson");
        let latin1 = TextStrategy.detect(b"caf\xe9 cr\xe8me", None).unwrap();
        assert_eq!(latin1.extension, ".txt");
    }

    #[test]
    fn ole_without_hint_is_generic_ole() {
        let mut content = b"\xd0\xcf\x11\xe0\xa1\xb1\x1a\xe1".to_vec();
        content.resize(1024, 0);
        let dt = TypeDetector::default().detect(&content, None);
        assert_eq!(dt.extension, ".ole");
    }

    #[test]
    fn alias_output_from_custom_strategy_is_normalized() {
        let detector = TypeDetector::new(vec![Box::new(Fixed(".pdf", "application/x-pdf"))]);
        let dt = detector.detect(b"anything", None);
        assert_eq!((dt.extension.as_str(), dt.mime.as_str()), (".pdf", "application/pdf"));
        assert_eq!(dt.reason, "fixed+alias");
    }

    #[test]
    fn unsupported_custom_output_is_rescued_or_degraded() {
        let detector = TypeDetector::new(vec![Box::new(Fixed(".xyz", "application/x-made-up"))]);
        assert_eq!(detector.detect(b"x", Some("run.sh")).extension, ".sh");
        assert!(detector.detect(b"x", None).is_generic_binary());
    }

    #[test]
    fn empty_pipeline_is_generic_binary() {
        let detector = TypeDetector::new(Vec::new());
        assert!(detector.detect(b"hello", Some("a.txt")).is_generic_binary());
    }
}
