//! Input resolution: turn a path, URL or byte buffer into a local PDF file.
//!
//! pdfium opens documents from a file-system path. URLs and in-memory
//! buffers are written into a `TempDir` that lives as long as the
//! [`ResolvedInput`], so cleanup happens on drop. The `%PDF` magic bytes are
//! checked up front so a wrong file type is reported as such, not as a
//! pdfium load failure.

use crate::error::FinMetricsError;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// A local PDF ready for pdfium.
pub enum ResolvedInput {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was a URL, downloaded into a temp directory.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
    /// Input was a byte buffer, spooled into a temp directory.
    Spooled { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } | ResolvedInput::Spooled { path, .. } => path,
        }
    }
}

pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve `input` (local path or http(s) URL) to a local PDF.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, FinMetricsError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

/// Spool an in-memory PDF to a temp file named `name`.
pub fn spool_bytes(name: &str, bytes: &[u8]) -> Result<ResolvedInput, FinMetricsError> {
    let file_name = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or("upload.pdf")
        .to_string();

    let temp_dir = TempDir::new().map_err(|e| FinMetricsError::Internal(e.to_string()))?;
    let path = temp_dir.path().join(&file_name);
    check_magic(&path, bytes)?;

    std::fs::write(&path, bytes)
        .map_err(|e| FinMetricsError::Internal(format!("Failed to write temp file: {}", e)))?;
    debug!("Spooled {} bytes to {}", bytes.len(), path.display());

    Ok(ResolvedInput::Spooled {
        path,
        _temp_dir: temp_dir,
    })
}

fn check_magic(path: &Path, head: &[u8]) -> Result<(), FinMetricsError> {
    if head.len() < 4 {
        return Err(FinMetricsError::CorruptPdf {
            path: path.to_path_buf(),
            detail: format!("only {} bytes", head.len()),
        });
    }
    if &head[..4] != PDF_MAGIC {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&head[..4]);
        return Err(FinMetricsError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }
    Ok(())
}

fn resolve_local(path_str: &str) -> Result<ResolvedInput, FinMetricsError> {
    let path = PathBuf::from(path_str);

    if !path.is_file() {
        return Err(FinMetricsError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(f) => {
            let mut head = Vec::with_capacity(4);
            f.take(4)
                .read_to_end(&mut head)
                .map_err(|e| FinMetricsError::CorruptPdf {
                    path: path.clone(),
                    detail: e.to_string(),
                })?;
            check_magic(&path, &head)?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(FinMetricsError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(FinMetricsError::FileNotFound { path });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, FinMetricsError> {
    info!("Downloading PDF from: {}", url);

    let failed = |reason: String| FinMetricsError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            FinMetricsError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let filename = filename_from_url(url);
    let temp_dir = TempDir::new().map_err(|e| FinMetricsError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    check_magic(&file_path, &bytes)?;

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| FinMetricsError::Internal(format!("Failed to write temp file: {}", e)))?;

    info!("Downloaded {} bytes to: {}", bytes.len(), file_path.display());

    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// Last path segment of `url` if it looks like a file name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_falls_back_without_extension() {
        assert_eq!(filename_from_url("https://x.io/reports/ar2023.pdf"), "ar2023.pdf");
        assert_eq!(filename_from_url("https://x.io/download"), "downloaded.pdf");
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let err = resolve_input("/definitely/not/here.pdf", 5).await.err().unwrap();
        assert!(matches!(err, FinMetricsError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn wrong_magic_is_not_a_pdf() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"PK\x03\x04zipdata").unwrap();
        let err = resolve_input(f.path().to_str().unwrap(), 5).await.err().unwrap();
        match err {
            FinMetricsError::NotAPdf { magic, .. } => assert_eq!(&magic, b"PK\x03\x04"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn tiny_file_is_corrupt() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"%P").unwrap();
        let err = resolve_input(f.path().to_str().unwrap(), 5).await.err().unwrap();
        assert!(matches!(err, FinMetricsError::CorruptPdf { .. }));
    }

    #[test]
    fn spooled_bytes_keep_their_name() {
        let input = spool_bytes("reports/annual.pdf", b"%PDF-1.7\n").unwrap();
        assert_eq!(input.path().file_name().unwrap(), "annual.pdf");
        assert!(input.path().exists());
    }

    #[test]
    fn spooled_temp_dir_is_removed_on_drop() {
        let input = spool_bytes("", b"%PDF-1.7\n").unwrap();
        let path = input.path().to_path_buf();
        assert_eq!(path.file_name().unwrap(), "upload.pdf");
        drop(input);
        assert!(!path.exists());
    }

    #[test]
    fn spooling_rejects_non_pdf() {
        assert!(matches!(
            spool_bytes("a.pdf", b"<html>"),
            Err(FinMetricsError::NotAPdf { .. })
        ));
    }
}
