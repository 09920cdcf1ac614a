//! Prompt templates — markdown files with optional `---` frontmatter.
//!
//! Frontmatter carries a name, a description, and a variable list.
//! Anything unparseable degrades to an empty-metadata template; a prompt
//! file never fails to parse, only to read.

use chrono::Local;
use std::path::{Path, PathBuf};

/// A parsed prompt template.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    pub name: String,
    pub description: String,
    pub variables: Vec<String>,
    pub body: String,
}

impl PromptTemplate {
    /// Substitutes known placeholder tokens into the body.
    ///
    /// `{{CURRENT_DATE}}` and `{{WORKSPACE_PATH}}` are replaced literally;
    /// unknown placeholders pass through unchanged.
    pub fn rendered(&self, workspace: &Path) -> String {
        self.body
            .replace("{{CURRENT_DATE}}", &Local::now().format("%Y-%m-%d").to_string())
            .replace("{{WORKSPACE_PATH}}", &workspace.to_string_lossy())
    }
}

/// Loads and renders prompt templates from the configured prompts directory.
pub struct PromptLoader {
    prompts_dir: PathBuf,
    workspace_dir: PathBuf,
}

impl PromptLoader {
    pub fn new(prompts_dir: PathBuf, workspace_dir: PathBuf) -> Self {
        Self {
            prompts_dir,
            workspace_dir,
        }
    }

    /// Load a template by its path relative to the prompts directory.
    /// `None` if the file cannot be read.
    pub fn load(&self, relative: &str) -> Option<PromptTemplate> {
        let path = self.prompts_dir.join(relative);
        match std::fs::read_to_string(&path) {
            Ok(content) => Some(parse(&content)),
            Err(e) => {
                tracing::warn!("⚠️ Could not read prompt file {}: {e}", path.display());
                None
            }
        }
    }

    /// Render a template against this loader's workspace directory.
    pub fn render(&self, template: &PromptTemplate) -> String {
        template.rendered(&self.workspace_dir)
    }
}

/// Parse markdown content with optional `---` frontmatter.
pub fn parse(content: &str) -> PromptTemplate {
    let mut name = String::new();
    let mut description = String::new();
    let mut variables = Vec::new();
    let mut body = content.to_string();

    if content.starts_with("---") {
        let parts: Vec<&str> = content.split("---").collect();
        // parts[0] is empty (before the first ---), parts[1] is frontmatter,
        // the rest is body (re-joined in case the body itself contains ---).
        if parts.len() >= 3 {
            let frontmatter = parts[1];
            body = parts[2..].join("---").trim().to_string();

            for line in frontmatter.lines() {
                let trimmed = line.trim();
                if let Some(value) = trimmed.strip_prefix("name:") {
                    name = value.trim().to_string();
                } else if let Some(value) = trimmed.strip_prefix("description:") {
                    description = value.trim().to_string();
                } else if let Some(item) = trimmed.strip_prefix("- ") {
                    if !item.starts_with('{') && !item.trim().is_empty() {
                        variables.push(item.trim().to_string());
                    }
                }
            }
        }
    }

    PromptTemplate {
        name,
        description,
        variables,
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_frontmatter() {
        let content = "---\nname: daily-report\ndescription: Morning summary\nvariables:\n- CURRENT_DATE\n---\nSummarize my day.";
        let template = parse(content);
        assert_eq!(template.name, "daily-report");
        assert_eq!(template.description, "Morning summary");
        assert_eq!(template.variables, vec!["CURRENT_DATE"]);
        assert_eq!(template.body, "Summarize my day.");
    }

    #[test]
    fn test_parse_without_frontmatter() {
        let template = parse("Just a plain prompt.");
        assert!(template.name.is_empty());
        assert_eq!(template.body, "Just a plain prompt.");
    }

    #[test]
    fn test_parse_unterminated_frontmatter_degrades() {
        // Opening delimiter but no closing one: the whole content is body.
        let template = parse("---\nname: broken");
        assert!(template.name.is_empty());
        assert_eq!(template.body, "---\nname: broken");
    }

    #[test]
    fn test_body_keeps_interior_delimiters() {
        let content = "---\nname: x\n---\nbefore\n---\nafter";
        let template = parse(content);
        assert_eq!(template.body, "before\n---\nafter");
    }

    #[test]
    fn test_render_substitutions() {
        let template = parse("Date: {{CURRENT_DATE}} in {{WORKSPACE_PATH}}; keep {{UNKNOWN}}.");
        let rendered = template.rendered(Path::new("/work"));
        assert!(rendered.contains("in /work"));
        assert!(rendered.contains("{{UNKNOWN}}"));
        assert!(!rendered.contains("{{CURRENT_DATE}}"));
    }

    #[test]
    fn test_loader_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let loader = PromptLoader::new(dir.path().to_path_buf(), dir.path().to_path_buf());
        assert!(loader.load("missing.md").is_none());
    }

    #[test]
    fn test_loader_reads_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.md"), "hello world").unwrap();
        let loader = PromptLoader::new(dir.path().to_path_buf(), dir.path().to_path_buf());
        let template = loader.load("hello.md").unwrap();
        assert_eq!(loader.render(&template), "hello world");
    }
}
