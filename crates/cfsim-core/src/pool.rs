//! Source file pool for comment mode.

use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::CoreError;
use crate::pacing::SimRng;

/// Largest number of files a pool keeps.
pub const MAX_POOL_FILES: usize = 20;

const LANGUAGES: &[(&str, &str)] = &[
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("js", "javascript"),
    ("jsx", "javascript"),
    ("py", "python"),
    ("java", "java"),
    ("go", "go"),
    ("cpp", "cpp"),
    ("c", "c"),
    ("h", "c"),
];

/// Extensions match case-insensitively.
fn known_language(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    LANGUAGES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, lang)| *lang)
}

/// Language tag for a file, from its extension. Unknown extensions map to
/// `javascript`.
pub fn language_for(path: &Path) -> &'static str {
    known_language(path).unwrap_or("javascript")
}

fn is_source_file(path: &Path) -> bool {
    known_language(path).is_some()
}

/// A file read from the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub language: &'static str,
    pub content: String,
}

impl SourceFile {
    /// Line count as the editor reports it (a trailing newline opens a line).
    pub fn line_count(&self) -> usize {
        self.content.split('\n').count()
    }
}

/// Up to [`MAX_POOL_FILES`] code files sampled from a directory tree. Files
/// are read lazily, one per request.
#[derive(Debug, Clone, Default)]
pub struct SourceFilePool {
    files: Vec<PathBuf>,
}

impl SourceFilePool {
    /// Walk `root` for code files and sample at most [`MAX_POOL_FILES`].
    ///
    /// A missing directory yields an empty pool.
    pub fn scan(root: &Path, rng: &mut SimRng) -> Self {
        if !root.is_dir() {
            warn!(dir = %root.display(), "source directory not found");
            return Self::default();
        }

        let mut files: Vec<PathBuf> = WalkDir::new(root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && is_source_file(e.path()))
            .map(|e| e.into_path())
            .collect();

        if files.len() > MAX_POOL_FILES {
            files = files
                .choose_multiple(rng, MAX_POOL_FILES)
                .cloned()
                .collect();
        }

        info!(dir = %root.display(), count = files.len(), "source files loaded");
        Self { files }
    }

    /// Pool over an explicit file list.
    pub fn from_files(files: Vec<PathBuf>) -> Self {
        Self { files }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Pick a random non-empty, readable file. Whitespace-only files count
    /// as non-empty.
    ///
    /// Each file is tried at most once per call, so this ends after at most
    /// `len()` reads.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Configuration` if the pool is empty or every file is
    /// empty or unreadable.
    pub fn pick(&self, rng: &mut SimRng) -> Result<SourceFile, CoreError> {
        let mut order: Vec<&PathBuf> = self.files.iter().collect();
        order.shuffle(rng);

        for path in order {
            match std::fs::read_to_string(path) {
                Ok(content) if !content.is_empty() => {
                    return Ok(SourceFile {
                        language: language_for(path),
                        path: path.clone(),
                        content,
                    });
                }
                Ok(_) => debug!(file = %path.display(), "skipping empty source file"),
                Err(e) => warn!(file = %path.display(), error = %e, "failed to read source file"),
            }
        }

        Err(CoreError::Configuration(
            "no readable source files in pool".to_owned(),
        ))
    }
}
