//! Template sources and the names the simulators look up.

use serde::{Deserialize, Serialize};

/// Name prefix shared by all commit content templates.
pub const COMMIT_CONTENT_PREFIX: &str = "commit/content-";

/// Commit message for one file change.
pub const COMMIT_MESSAGE: &str = "commit/message";

/// Persona preamble sent as the system turn of a comment request.
pub const COMMENT_SYSTEM: &str = "comment/system";

/// Fenced code block quoting a source file.
pub const COMMENT_CODE_BLOCK: &str = "comment/code_block";

/// User turn asking for comments on the quoted block.
pub const COMMENT_USER: &str = "comment/user";

/// A named template and its Jinja2 source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// Template name used for lookup (e.g., `commit/message`).
    pub name: String,

    /// Raw Jinja2 template source.
    pub source: String,
}

impl PromptTemplate {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }
}

pub(crate) const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    ("commit/content-1", include_str!("../templates/commit/content-1.j2")),
    ("commit/content-2", include_str!("../templates/commit/content-2.j2")),
    ("commit/content-3", include_str!("../templates/commit/content-3.j2")),
    ("commit/content-4", include_str!("../templates/commit/content-4.j2")),
    ("commit/content-5", include_str!("../templates/commit/content-5.j2")),
    ("commit/content-6", include_str!("../templates/commit/content-6.j2")),
    (COMMIT_MESSAGE, include_str!("../templates/commit/message.j2")),
    (COMMENT_SYSTEM, include_str!("../templates/comment/system.j2")),
    (COMMENT_CODE_BLOCK, include_str!("../templates/comment/code_block.j2")),
    (COMMENT_USER, include_str!("../templates/comment/user.j2")),
];
