use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use minijinja::{Environment, ErrorKind};
use tracing::debug;

use crate::error::PmError;
use crate::template::{BUILTIN_TEMPLATES, PromptTemplate};

/// File extensions picked up by [`PromptManager::load_dir`].
const TEMPLATE_EXTENSIONS: &[&str] = &["j2", "jinja"];

/// Manages text templates and renders them with context variables.
#[derive(Debug)]
pub struct PromptManager {
    env: Environment<'static>,
    names: BTreeSet<String>,
}

impl PromptManager {
    /// Create a manager with the built-in templates registered.
    ///
    /// # Errors
    ///
    /// Returns `PmError::InvalidTemplate` if a built-in template fails to parse.
    pub fn new() -> Result<Self, PmError> {
        let mut pm = Self {
            env: Environment::new(),
            names: BTreeSet::new(),
        };
        for (name, source) in BUILTIN_TEMPLATES {
            pm.add_template(PromptTemplate::new(*name, *source))?;
        }
        Ok(pm)
    }

    /// Load all `.j2` / `.jinja` templates under a directory.
    ///
    /// The template name is the path relative to `dir` without extension,
    /// using `/` separators, so `commit/content-1.j2` overrides the built-in
    /// `commit/content-1`.
    ///
    /// # Errors
    ///
    /// Returns `PmError::Io` if the directory cannot be read.
    /// Returns `PmError::InvalidTemplate` if a file fails to parse.
    pub fn load_dir(&mut self, dir: &Path) -> Result<(), PmError> {
        self.load_dir_inner(dir, dir)
    }

    fn load_dir_inner(&mut self, root: &Path, dir: &Path) -> Result<(), PmError> {
        let mut entries = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(|e| e.path());

        for entry in entries {
            let path = entry.path();
            if path.is_dir() {
                self.load_dir_inner(root, &path)?;
                continue;
            }

            let is_template = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| TEMPLATE_EXTENSIONS.contains(&ext));
            if !is_template {
                continue;
            }

            let Some(name) = template_name(root, &path) else {
                continue;
            };
            let source = fs::read_to_string(&path)?;
            debug!(name = %name, path = %path.display(), "loaded template override");
            self.add_template(PromptTemplate::new(name, source))?;
        }
        Ok(())
    }

    /// Register a single template, replacing any template with the same name.
    ///
    /// # Errors
    ///
    /// Returns `PmError::InvalidTemplate` if the source fails to parse.
    pub fn add_template(&mut self, template: PromptTemplate) -> Result<(), PmError> {
        let PromptTemplate { name, source } = template;
        self.env
            .add_template_owned(name.clone(), source)
            .map_err(|e| PmError::InvalidTemplate(format!("{name}: {e}")))?;
        self.names.insert(name);
        Ok(())
    }

    /// Render a template by name with the given context.
    ///
    /// # Errors
    ///
    /// Returns `PmError::TemplateNotFound` for unknown names.
    /// Returns `PmError::RenderError` if rendering fails.
    pub fn render(&self, name: &str, ctx: &serde_json::Value) -> Result<String, PmError> {
        let template = self.env.get_template(name).map_err(|e| match e.kind() {
            ErrorKind::TemplateNotFound => PmError::TemplateNotFound(name.to_owned()),
            _ => PmError::RenderError(format!("{name}: {e}")),
        })?;
        template
            .render(ctx)
            .map_err(|e| PmError::RenderError(format!("{name}: {e}")))
    }

    /// Names of all registered templates, sorted.
    pub fn list_templates(&self) -> Vec<&str> {
        self.names.iter().map(String::as_str).collect()
    }

    /// Names of registered templates starting with `prefix`, sorted.
    pub fn templates_with_prefix(&self, prefix: &str) -> Vec<&str> {
        self.names
            .iter()
            .filter(|n| n.starts_with(prefix))
            .map(String::as_str)
            .collect()
    }
}

fn template_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?.with_extension("");
    let parts: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::template::{
        COMMENT_CODE_BLOCK, COMMENT_SYSTEM, COMMENT_USER, COMMIT_CONTENT_PREFIX, COMMIT_MESSAGE,
    };

    #[test]
    fn test_should_register_builtin_templates() {
        let pm = PromptManager::new().expect("should create manager");
        assert_eq!(pm.templates_with_prefix(COMMIT_CONTENT_PREFIX).len(), 6);
        for name in [COMMIT_MESSAGE, COMMENT_SYSTEM, COMMENT_CODE_BLOCK, COMMENT_USER] {
            assert!(pm.list_templates().contains(&name), "missing {name}");
        }
    }

    #[test]
    fn test_should_render_commit_content_without_trailing_newline() {
        let pm = PromptManager::new().expect("should create manager");
        let out = pm
            .render(
                "commit/content-2",
                &json!({"title": "README", "version": "1.2.3", "timestamp": "t"}),
            )
            .expect("should render");
        assert_eq!(out, "# README\n\nVersion: 1.2.3\n\n这是一个测试文件");
    }

    #[test]
    fn test_should_not_escape_code_in_blocks() {
        let pm = PromptManager::new().expect("should create manager");
        let out = pm
            .render(
                COMMENT_CODE_BLOCK,
                &json!({"language": "python", "content": "if a < b and {{ x }}:\n    pass"}),
            )
            .expect("should render");
        assert_eq!(out, "```python\nif a < b and {{ x }}:\n    pass\n```");
    }

    #[test]
    fn test_should_render_commit_message() {
        let pm = PromptManager::new().expect("should create manager");
        let out = pm
            .render(
                COMMIT_MESSAGE,
                &json!({"repo_full_name": "team/docs", "file_path": "README.md"}),
            )
            .expect("should render");
        assert_eq!(out, "更新文件 team/docs/README.md");
    }

    #[test]
    fn test_should_report_unknown_template() {
        let pm = PromptManager::new().expect("should create manager");
        let err = pm.render("nope", &json!({})).expect_err("should fail");
        assert!(matches!(err, PmError::TemplateNotFound(name) if name == "nope"));
    }

    #[test]
    fn test_should_reject_invalid_template_source() {
        let mut pm = PromptManager::new().expect("should create manager");
        let err = pm
            .add_template(PromptTemplate::new("broken", "{% if %}"))
            .expect_err("should fail");
        assert!(matches!(err, PmError::InvalidTemplate(_)));
    }

    #[test]
    fn test_should_override_builtin_from_directory() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        std::fs::create_dir_all(dir.path().join("commit")).expect("should create dir");
        std::fs::write(dir.path().join("commit/message.j2"), "chore: touch {{ file_path }}")
            .expect("should write");
        std::fs::write(dir.path().join("commit/content-7.jinja"), "# {{ title }}")
            .expect("should write");
        std::fs::write(dir.path().join("notes.txt"), "ignored").expect("should write");

        let mut pm = PromptManager::new().expect("should create manager");
        pm.load_dir(dir.path()).expect("should load dir");

        let out = pm
            .render(COMMIT_MESSAGE, &json!({"file_path": "a.md"}))
            .expect("should render");
        assert_eq!(out, "chore: touch a.md");
        assert_eq!(pm.templates_with_prefix(COMMIT_CONTENT_PREFIX).len(), 7);
        assert!(!pm.list_templates().contains(&"notes"));
    }
}
