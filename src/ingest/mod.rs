pub mod pdf;

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::models::{Document, TextChunk};
use crate::traits::DocumentLoader;

/// Loads every `.pdf` file below a directory.
#[derive(Clone, Debug)]
pub struct PdfDirectoryLoader {
    data_dir: PathBuf,
}

impl PdfDirectoryLoader {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn pdf_files(&self) -> Result<Vec<PathBuf>> {
        if !self.data_dir.is_dir() {
            anyhow::bail!("directory {} does not exist", self.data_dir.display());
        }

        let mut files: Vec<PathBuf> = WalkDir::new(&self.data_dir)
            .min_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.path().to_path_buf())
            .filter(|path| is_pdf(path))
            .collect();

        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl DocumentLoader for PdfDirectoryLoader {
    async fn load(&self) -> Result<Vec<Document>> {
        let files = self.pdf_files()?;
        if files.is_empty() {
            anyhow::bail!("no PDF files found in {}", self.data_dir.display());
        }

        let mut documents = Vec::new();
        for file in &files {
            match pdf::extract_pdf_documents(file).await {
                Ok(mut extracted) if !extracted.is_empty() => documents.append(&mut extracted),
                Ok(_) => tracing::warn!(path = %file.display(), "pdf yielded no text, skipping"),
                Err(err) => {
                    tracing::warn!(path = %file.display(), error = %err, "skipping unreadable pdf")
                }
            }
        }

        if documents.is_empty() {
            anyhow::bail!(
                "no text could be extracted from the {} PDF file(s) in {}",
                files.len(),
                self.data_dir.display()
            );
        }

        tracing::info!(
            files = files.len(),
            documents = documents.len(),
            "loaded pdf documents"
        );
        Ok(documents)
    }
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// Splits documents into chunks of at most `chunk_size` words, preferring
/// sentence boundaries. Consecutive chunks share up to `chunk_overlap` words
/// of trailing sentences.
pub fn build_chunks(documents: &[Document], chunk_size: usize, chunk_overlap: usize) -> Vec<TextChunk> {
    let chunk_size = chunk_size.max(1);
    let chunk_overlap = chunk_overlap.min(chunk_size - 1);
    let mut chunks = Vec::new();

    for document in documents {
        let normalized = normalize_text(&document.text);
        if normalized.is_empty() {
            continue;
        }

        let pieces = sentence_pieces(&normalized, chunk_size, chunk_overlap);
        for (chunk_index, words) in pack_pieces(pieces, chunk_size, chunk_overlap)
            .into_iter()
            .enumerate()
        {
            chunks.push(TextChunk {
                id: Uuid::new_v4().to_string(),
                document_id: document.id.clone(),
                word_count: words.len(),
                text: words.join(" "),
                file_name: document.file_name.clone(),
                file_path: document.file_path.clone(),
                page_label: document.page_label.clone(),
                chunk_index,
            });
        }
    }

    chunks
}

/// Sentences as word lists; sentences longer than `chunk_size` are cut into
/// overlapping word windows.
fn sentence_pieces(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<Vec<&str>> {
    let step = chunk_size.saturating_sub(chunk_overlap).max(1);
    let mut pieces = Vec::new();

    for sentence in split_sentences(text) {
        let words: Vec<&str> = sentence.split_whitespace().collect();
        if words.len() <= chunk_size {
            pieces.push(words);
            continue;
        }

        let mut start = 0;
        while start < words.len() {
            let end = (start + chunk_size).min(words.len());
            pieces.push(words[start..end].to_vec());
            if end == words.len() {
                break;
            }
            start += step;
        }
    }

    pieces
}

fn pack_pieces<'a>(
    pieces: Vec<Vec<&'a str>>,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<Vec<&'a str>> {
    let mut packed = Vec::new();
    let mut current: Vec<Vec<&'a str>> = Vec::new();
    let mut current_words = 0;

    for piece in pieces {
        if !current.is_empty() && current_words + piece.len() > chunk_size {
            packed.push(current.concat());

            let mut carry: Vec<Vec<&'a str>> = Vec::new();
            let mut carried = 0;
            for previous in current.iter().rev() {
                if carried + previous.len() > chunk_overlap {
                    break;
                }
                carried += previous.len();
                carry.push(previous.clone());
            }
            carry.reverse();

            while !carry.is_empty() && carried + piece.len() > chunk_size {
                carried -= carry.remove(0).len();
            }

            current = carry;
            current_words = carried;
        }

        current_words += piece.len();
        current.push(piece);
    }

    if !current.is_empty() {
        packed.push(current.concat());
    }

    packed
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        if !matches!(ch, '.' | '!' | '?') {
            continue;
        }
        let at_boundary = chars
            .peek()
            .map_or(true, |(_, next)| next.is_whitespace());
        if at_boundary {
            let end = idx + ch.len_utf8();
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }

    sentences
}

pub(crate) fn normalize_text(input: &str) -> String {
    input
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace('\u{00A0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
