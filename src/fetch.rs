//! Content fetching from local paths and HTTP(S) URLs.
//!
//! Both sources are read with a hard byte cap: reading stops and the partial
//! buffer is discarded as soon as the cap is exceeded, whatever the declared
//! size says. Every per-item failure (missing file, HTTP error, oversize,
//! unsupported content) is logged and reported as `None` so batch callers
//! can move on to the next source.
//!
//! # Naming
//!
//! | Source | Name hint |
//! |--------|-----------|
//! | local path | the file's own name |
//! | URL | `Content-Disposition`, else URL basename, else generated |
//!
//! The hint feeds detection, then [`compose_file_name`] replaces its
//! extension with the detected one.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use crate::config::FetchConfig;
use crate::detector::TypeDetector;
use crate::models::{DetectedType, FileDetail};
use crate::naming::{compose_file_name, derive_original_name};

const READ_CHUNK: usize = 8192;

/// Raw bytes plus the name hint they arrived with.
#[derive(Debug)]
pub struct Fetched {
    pub original_name: String,
    pub content: Vec<u8>,
}

/// Accumulates bytes until a cap is crossed.
struct CappedBuffer {
    buf: Vec<u8>,
    cap: u64,
}

impl CappedBuffer {
    fn new(cap: u64) -> Self {
        Self {
            buf: Vec::new(),
            cap,
        }
    }

    /// `false` once the total would exceed the cap.
    fn push(&mut self, bytes: &[u8]) -> bool {
        if self.buf.len() as u64 + bytes.len() as u64 > self.cap {
            return false;
        }
        self.buf.extend_from_slice(bytes);
        true
    }

    fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

pub struct Fetcher {
    client: reqwest::Client,
    max_bytes: u64,
    detector: TypeDetector,
}

impl Fetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .read_timeout(Duration::from_secs(config.read_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            max_bytes: config.max_bytes,
            detector: TypeDetector::default(),
        })
    }

    pub fn detector(&self) -> &TypeDetector {
        &self.detector
    }

    /// Fetches, detects, and names one source. Generic binary content is
    /// rejected.
    pub async fn fetch(&self, source: &str) -> Option<FileDetail> {
        let fetched = self.fetch_raw(source).await?;
        let detected = self.detect(&fetched);
        if detected.is_generic_binary() {
            warn!(source, reason = %detected.reason, "unsupported content skipped");
            return None;
        }
        let file_name = compose_file_name(&fetched.original_name, &detected.extension);
        debug!(source, file_name = %file_name, mime = %detected.mime, "fetched");
        Some(FileDetail {
            file_name,
            mime_type: detected.mime.clone(),
            content: fetched.content,
            detected,
        })
    }

    /// Fetches sources in order, dropping the ones that fail.
    pub async fn fetch_many(&self, sources: &[String]) -> Vec<FileDetail> {
        let mut details = Vec::with_capacity(sources.len());
        for source in sources {
            match self.fetch(source).await {
                Some(detail) => details.push(detail),
                None => warn!(source = %source, "failed to get file detail"),
            }
        }
        details
    }

    pub fn detect(&self, fetched: &Fetched) -> DetectedType {
        self.detector
            .detect(&fetched.content, Some(&fetched.original_name))
    }

    /// Bytes and name hint without detection.
    pub async fn fetch_raw(&self, source: &str) -> Option<Fetched> {
        if is_url(source) {
            self.fetch_url(source).await
        } else {
            self.fetch_local(Path::new(source)).await
        }
    }

    async fn fetch_url(&self, url: &str) -> Option<Fetched> {
        let mut resp = match self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
        {
            Ok(r) => r,
            Err(e) => {
                warn!(url, error = %e, "request failed");
                return None;
            }
        };

        let disposition = resp
            .headers()
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let original_name = derive_original_name(url, disposition.as_deref());
        debug!(url, original_name = %original_name, "name hint");

        if let Some(len) = resp.content_length() {
            if len > self.max_bytes {
                warn!(url, len, max = self.max_bytes, "content too large (header)");
                return None;
            }
        }

        let mut buffer = CappedBuffer::new(self.max_bytes);
        loop {
            match resp.chunk().await {
                Ok(Some(chunk)) => {
                    if !buffer.push(&chunk) {
                        warn!(url, max = self.max_bytes, "content too large while streaming");
                        return None;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(url, error = %e, "body read failed");
                    return None;
                }
            }
        }

        Some(Fetched {
            original_name,
            content: buffer.into_inner(),
        })
    }

    async fn fetch_local(&self, path: &Path) -> Option<Fetched> {
        let original_name = path.file_name()?.to_string_lossy().into_owned();
        match tokio::fs::metadata(path).await {
            Ok(meta) if !meta.is_file() => {
                warn!(path = %path.display(), "not a regular file");
                return None;
            }
            Ok(meta) if meta.len() > self.max_bytes => {
                warn!(path = %path.display(), len = meta.len(), max = self.max_bytes, "local file too large");
                return None;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(path = %path.display(), error = %e, "file not readable");
                return None;
            }
        }

        // The size can change between stat and read, so the cap still applies.
        let content = match read_capped(path, self.max_bytes).await {
            Ok(Some(content)) => content,
            Ok(None) => {
                warn!(path = %path.display(), max = self.max_bytes, "local file too large while reading");
                return None;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "local read failed");
                return None;
            }
        };
        Some(Fetched {
            original_name,
            content,
        })
    }
}

async fn read_capped(path: &Path, cap: u64) -> std::io::Result<Option<Vec<u8>>> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut buffer = CappedBuffer::new(cap);
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = file.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        if !buffer.push(&chunk[..n]) {
            return Ok(None);
        }
    }
    Ok(Some(buffer.into_inner()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    fn fetcher(max_bytes: u64) -> Fetcher {
        Fetcher::new(&FetchConfig {
            max_bytes,
            ..FetchConfig::default()
        })
        .unwrap()
    }

    /// Serves one canned response per connection.
    async fn serve(head: String, body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let head = head.clone();
                let body = body.clone();
                tokio::spawn(async move {
                    let mut req = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !req.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => req.extend_from_slice(&buf[..n]),
                        }
                    }
                    let _ = socket.write_all(head.as_bytes()).await;
                    let _ = socket.write_all(&body).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        format!("http://{}", addr)
    }

    #[test]
    fn capped_buffer_rejects_overflow() {
        let mut buf = CappedBuffer::new(4);
        assert!(buf.push(b"ab"));
        assert!(buf.push(b"cd"));
        assert!(!buf.push(b"e"));
        assert_eq!(buf.into_inner(), b"abcd");
    }

    #[tokio::test]
    async fn local_file_gets_detected_name() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("Quarterly Report.txt");
        std::fs::write(&path, b"%PDF-1.5\nbinary").unwrap();

        let detail = fetcher(1024).fetch(path.to_str().unwrap()).await.unwrap();
        assert_eq!(detail.file_name, "quarterly_report.pdf");
        assert_eq!(detail.mime_type, "application/pdf");
        assert_eq!(detail.content, b"%PDF-1.5\nbinary");
    }

    #[tokio::test]
    async fn local_file_over_cap_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("big.txt");
        std::fs::write(&path, vec![b'a'; 2048]).unwrap();
        assert!(fetcher(1024).fetch(path.to_str().unwrap()).await.is_none());
        assert!(fetcher(4096).fetch(path.to_str().unwrap()).await.is_some());
    }

    #[tokio::test]
    async fn missing_and_binary_files_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let f = fetcher(1024);
        assert!(f.fetch(tmp.path().join("absent.pdf").to_str().unwrap()).await.is_none());
        let bin = tmp.path().join("blob.dat");
        std::fs::write(&bin, [0u8, 159, 146, 150, 0, 1]).unwrap();
        assert!(f.fetch(bin.to_str().unwrap()).await.is_none());
    }

    #[tokio::test]
    async fn fetch_many_keeps_successes_in_order() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a.md");
        let b = tmp.path().join("b.json");
        std::fs::write(&a, "# Title\n\nbody\n").unwrap();
        std::fs::write(&b, "{\"k\": 1}").unwrap();
        let sources = vec![
            a.to_string_lossy().into_owned(),
            tmp.path().join("missing").to_string_lossy().into_owned(),
            b.to_string_lossy().into_owned(),
        ];
        let details = fetcher(1024).fetch_many(&sources).await;
        let names: Vec<_> = details.iter().map(|d| d.file_name.as_str()).collect();
        assert_eq!(names, vec!["a.md", "b.json"]);
    }

    #[tokio::test]
    async fn url_uses_content_disposition_name() {
        let body = b"{\"hello\": \"world\"}".to_vec();
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nContent-Disposition: attachment; filename=\"Data Export.bin\"\r\nConnection: close\r\n\r\n",
            body.len()
        );
        let base = serve(head, body).await;
        let detail = fetcher(1024).fetch(&format!("{}/download", base)).await.unwrap();
        assert_eq!(detail.file_name, "data_export.json");
        assert_eq!(detail.mime_type, "application/json");
    }

    #[tokio::test]
    async fn url_basename_used_without_header() {
        let body = b"plain words only".to_vec();
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        let base = serve(head, body).await;
        let detail = fetcher(1024).fetch(&format!("{}/docs/Read%20Me", base)).await.unwrap();
        assert_eq!(detail.file_name, "read_me.txt");
    }

    #[tokio::test]
    async fn url_over_cap_is_none() {
        let body = vec![b'x'; 4096];
        // No Content-Length: the streaming cap has to catch it.
        let head = "HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n".to_string();
        let base = serve(head, body.clone()).await;
        assert!(fetcher(1000).fetch_raw(&format!("{}/big.txt", base)).await.is_none());

        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        let base = serve(head, body).await;
        assert!(fetcher(1000).fetch_raw(&format!("{}/big.txt", base)).await.is_none());
        assert!(fetcher(8192).fetch_raw(&format!("{}/big.txt", base)).await.is_some());
    }

    #[tokio::test]
    async fn http_error_status_is_none() {
        let head = "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string();
        let base = serve(head, Vec::new()).await;
        assert!(fetcher(1024).fetch_raw(&format!("{}/gone.pdf", base)).await.is_none());
    }
}
