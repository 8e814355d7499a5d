use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, warn};

use crate::{doctype::DocType, html::html_to_text};

/// One successfully parsed source file. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub content: String,
    pub source_path: PathBuf,
    /// Explicit category from MDX front matter, when the dump carries one.
    pub category: Option<String>,
}

/// Loads every supported file under the doc type's source directory.
///
/// Per-file parse failures are logged and skipped; one corrupt file never
/// aborts the run. Only a missing or unreadable directory is fatal.
pub async fn load_documents(doc_type: DocType, source_dir: &Path) -> Result<Vec<RawDocument>> {
    anyhow::ensure!(
        source_dir.is_dir(),
        "source directory {} does not exist",
        source_dir.display()
    );

    let mut entries = tokio::fs::read_dir(source_dir)
        .await
        .with_context(|| format!("failed to read source directory {}", source_dir.display()))?;

    let mut paths = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("failed to enumerate {}", source_dir.display()))?
    {
        let path = entry.path();
        if path.is_file() {
            paths.push(path);
        }
    }
    // Identifier determinism depends on a stable document ordering.
    paths.sort();

    let mut documents = Vec::new();
    for path in paths {
        let Some(extension) = normalized_extension(&path) else {
            debug!(path = %path.display(), "skipping file without extension");
            continue;
        };
        if !doc_type.supported_extensions().contains(&extension.as_str()) {
            debug!(path = %path.display(), "skipping unsupported file type");
            continue;
        }

        match parse_file(&path, &extension).await {
            Ok((content, category)) => documents.push(RawDocument {
                content,
                source_path: path,
                category,
            }),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to load source file, skipping");
            }
        }
    }

    info!(
        count = documents.len(),
        dir = %source_dir.display(),
        "loaded documents"
    );
    Ok(documents)
}

async fn parse_file(path: &Path, extension: &str) -> Result<(String, Option<String>)> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read file {}", path.display()))?;
    if bytes.is_empty() {
        return Err(anyhow!("file content is empty"));
    }
    let text = String::from_utf8(bytes).map_err(|_| anyhow!("file is not valid UTF-8"))?;

    let (text, category) = match extension {
        "html" | "htm" => (html_to_text(&text), None),
        _ => {
            let (body, category) = strip_front_matter(&text);
            (body.to_string(), category)
        }
    };

    if text.trim().is_empty() {
        return Err(anyhow!("file contains only whitespace"));
    }
    Ok((text, category))
}

fn normalized_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Splits a leading `---` front-matter block off a Markdown document,
/// returning the body and the `category` value if one is declared.
fn strip_front_matter(text: &str) -> (&str, Option<String>) {
    let Some(rest) = text.strip_prefix("---\n") else {
        return (text, None);
    };
    let Some(end) = rest.find("\n---") else {
        return (text, None);
    };

    let block = &rest[..end];
    let category = block.lines().find_map(|line| {
        line.strip_prefix("category:")
            .map(|value| value.trim().trim_matches('"').to_string())
            .filter(|value| !value.is_empty())
    });

    let body = rest[end + 4..].trim_start_matches('\n');
    (body, category)
}
