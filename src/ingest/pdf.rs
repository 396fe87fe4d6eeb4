use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;
use tokio::process::Command;
use uuid::Uuid;

use super::normalize_text;
use crate::models::Document;

/// Extracts one document per non-empty page when poppler is installed,
/// otherwise a single document for the whole file via `pdf-extract`.
pub async fn extract_pdf_documents(pdf_path: &Path) -> Result<Vec<Document>> {
    let file_name = pdf_path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| anyhow::anyhow!("path has no file name: {}", pdf_path.display()))?;
    let file_path = pdf_path.display().to_string();

    let mut documents = Vec::new();

    if has_command("pdftotext").await && has_command("pdfinfo").await {
        let page_count = get_pdf_page_count(pdf_path).await.unwrap_or(0);
        for page in 1..=page_count {
            let output = Command::new("pdftotext")
                .arg("-f")
                .arg(page.to_string())
                .arg("-l")
                .arg(page.to_string())
                .arg("-layout")
                .arg("-nopgbrk")
                .arg(pdf_path)
                .arg("-")
                .output()
                .await
                .with_context(|| format!("failed to run pdftotext for page {}", page))?;

            if !output.status.success() {
                continue;
            }

            let text = normalize_text(&String::from_utf8_lossy(&output.stdout));
            if text.is_empty() {
                continue;
            }

            documents.push(Document {
                id: Uuid::new_v4().to_string(),
                text,
                file_name: file_name.clone(),
                file_path: file_path.clone(),
                page_label: Some(page.to_string()),
            });
        }
    }

    if documents.is_empty() {
        let path = pdf_path.to_path_buf();
        let extracted = tokio::task::spawn_blocking(move || pdf_extract::extract_text(&path))
            .await
            .with_context(|| format!("PDF extraction task panicked for {}", pdf_path.display()))?
            .with_context(|| format!("failed to extract text from {}", pdf_path.display()))?;

        let text = normalize_text(&extracted);
        if !text.is_empty() {
            documents.push(Document {
                id: Uuid::new_v4().to_string(),
                text,
                file_name,
                file_path,
                page_label: None,
            });
        }
    }

    Ok(documents)
}

async fn get_pdf_page_count(pdf_path: &Path) -> Result<usize> {
    let output = Command::new("pdfinfo")
        .arg(pdf_path)
        .output()
        .await
        .context("failed to run pdfinfo")?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("pdfinfo exited with non-zero status"));
    }

    parse_page_count(&String::from_utf8_lossy(&output.stdout))
}

fn parse_page_count(pdfinfo_output: &str) -> Result<usize> {
    let regex = Regex::new(r"(?m)^Pages:\s+(\d+)\s*$")?;
    regex
        .captures(pdfinfo_output)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<usize>().ok())
        .ok_or_else(|| anyhow::anyhow!("unable to parse page count from pdfinfo"))
}

async fn has_command(binary: &str) -> bool {
    // poppler tools exit non-zero for --version, so probe PATH with `which`.
    Command::new("which")
        .arg(binary)
        .output()
        .await
        .map(|out| out.status.success() && !out.stdout.is_empty())
        .unwrap_or(false)
}
