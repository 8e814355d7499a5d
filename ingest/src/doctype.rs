use std::{fmt, path::PathBuf};

use clap::ValueEnum;

/// Closed set of documentation families the pipeline knows how to ingest.
///
/// Each variant maps to a source directory, an index namespace, and the
/// external base URL that provenance links are rewritten against. The
/// `value` names are the tags accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum DocType {
    #[value(name = "Nextjs")]
    Nextjs,
    #[value(name = "React")]
    React,
    #[value(name = "Express")]
    Express,
    #[value(name = "ai")]
    Ai,
}

impl DocType {
    /// Tag used in deterministic vector identifiers and the `type` metadata key.
    pub fn tag(&self) -> &'static str {
        match self {
            DocType::Nextjs => "Nextjs",
            DocType::React => "React",
            DocType::Express => "Express",
            DocType::Ai => "ai",
        }
    }

    /// Vector index namespace: the lower-cased tag.
    pub fn namespace(&self) -> String {
        self.tag().to_ascii_lowercase()
    }

    /// Directory the raw scraped documents live in.
    pub fn source_dir(&self) -> PathBuf {
        let dir = match self {
            DocType::Nextjs => "next-docs-raw-data",
            DocType::React => "react-docs-raw-data",
            DocType::Express => "express-docs-raw-data",
            DocType::Ai => "ai-docs-raw-data",
        };
        PathBuf::from(dir)
    }

    /// Base URL substituted for the local source directory when deriving
    /// the canonical `source` metadata value.
    pub fn docs_base_url(&self) -> String {
        format!("https://{}-docs", self.namespace())
    }

    /// File extensions this family's source dump may contain.
    pub fn supported_extensions(&self) -> &'static [&'static str] {
        match self {
            DocType::Ai => &["md", "mdx"],
            _ => &["html", "htm", "md", "mdx"],
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
