//! Season document loading.
//!
//! Locates the season PDF under the documents directory and extracts its
//! text as one page-ordered string. Extraction tries the pure-Rust lopdf
//! backend first and falls back to the `pdftotext` binary, both on blocking
//! threads so the async executor stays responsive. Any failure here is
//! fatal at startup; the service never runs without its document.

use std::path::{Path, PathBuf};

use uuid::Uuid;
use walkdir::WalkDir;

use crate::error::{QaError, Result};

/// First PDF under `dir`, in path order so repeated startups pick the same
/// file when several are present.
pub fn find_season_pdf(dir: &Path) -> Result<PathBuf> {
    let mut pdfs: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("pdf"))
                .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();

    pdfs.sort();
    pdfs.into_iter()
        .next()
        .ok_or_else(|| QaError::DocumentLoad(format!("no PDF found under {}", dir.display())))
}

/// Extracts the full text of the PDF at `path`.
pub async fn extract_text(path: &Path) -> Result<String> {
    let data = tokio::fs::read(path)
        .await
        .map_err(|e| QaError::DocumentLoad(format!("failed to read {}: {e}", path.display())))?;

    let data_for_fallback = data.clone();
    let lopdf_result = tokio::task::spawn_blocking(move || lopdf_extract(&data))
        .await
        .map_err(|e| QaError::DocumentLoad(format!("extraction task failed: {e}")))?;

    let lopdf_err = match lopdf_result {
        Ok(text) => {
            tracing::info!(
                chars = text.chars().count(),
                "extracted PDF text with lopdf"
            );
            return Ok(text);
        }
        Err(e) => e,
    };

    tracing::warn!(error = %lopdf_err, "lopdf extraction failed, falling back to pdftotext");

    let fallback = tokio::task::spawn_blocking(move || pdftotext_extract(&data_for_fallback))
        .await
        .map_err(|e| QaError::DocumentLoad(format!("extraction task failed: {e}")))?;

    match fallback {
        Ok(text) => {
            tracing::info!(
                chars = text.chars().count(),
                "extracted PDF text with pdftotext"
            );
            Ok(text)
        }
        Err(pdftotext_err) => Err(QaError::DocumentLoad(format!(
            "both PDF backends failed: lopdf: {lopdf_err}; pdftotext: {pdftotext_err}"
        ))),
    }
}

/// Pure-Rust extraction. Pages that fail individually are skipped; an
/// entirely empty result counts as failure so the fallback gets a chance.
fn lopdf_extract(data: &[u8]) -> anyhow::Result<String> {
    use lopdf::Document;

    let doc = Document::load_mem(data)
        .map_err(|e| anyhow::anyhow!("lopdf failed to parse PDF: {e}"))?;

    let mut all_text = String::new();
    for (page_num, _page_id) in doc.get_pages() {
        match doc.extract_text(&[page_num]) {
            Ok(page_text) => {
                if !all_text.is_empty() && !page_text.is_empty() {
                    all_text.push('\n');
                }
                all_text.push_str(&page_text);
            }
            Err(e) => {
                tracing::debug!("lopdf: failed to extract text from page {page_num}: {e}");
            }
        }
    }

    if all_text.trim().is_empty() {
        anyhow::bail!("lopdf extracted no text from PDF");
    }
    Ok(all_text)
}

/// Extraction via the `pdftotext` binary. The temp file name carries a UUID
/// so concurrent extractions cannot collide.
fn pdftotext_extract(data: &[u8]) -> anyhow::Result<String> {
    use std::process::Command;

    let temp_file = std::env::temp_dir().join(format!("season_pdf_{}.pdf", Uuid::new_v4()));
    std::fs::write(&temp_file, data)
        .map_err(|e| anyhow::anyhow!("failed to write temp PDF: {e}"))?;

    let output = Command::new("pdftotext")
        .arg("-layout")
        .arg("-enc")
        .arg("UTF-8")
        .arg(&temp_file)
        .arg("-")
        .output();
    let _ = std::fs::remove_file(&temp_file);

    match output {
        Ok(output) if output.status.success() => {
            let text = String::from_utf8_lossy(&output.stdout).to_string();
            if text.trim().is_empty() {
                anyhow::bail!("pdftotext produced no text output");
            }
            Ok(text)
        }
        Ok(output) => {
            let error_msg = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("pdftotext failed: {error_msg}");
        }
        Err(e) => {
            anyhow::bail!("pdftotext command failed: {e} (is poppler installed?)");
        }
    }
}
