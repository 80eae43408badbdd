//! Writes the `.debate-kit/` directory from embedded templates.

use super::error::{InitError, InitResult};
use super::templates::{get_template, list_templates};
use crate::config::CONFIG_DIR;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Files written by `--minimal`: one debating pair and its roster.
const MINIMAL_TEMPLATES: &[&str] = &[
    "config.toml",
    "agents/proponent.md",
    "agents/challenger.md",
    "rosters/default.yaml",
];

#[derive(Debug, Clone)]
pub struct InitOptions {
    /// Project root; `.debate-kit/` is created inside it.
    pub target_dir: PathBuf,

    /// Write into an existing `.debate-kit/`, overwriting template files.
    pub force: bool,

    /// Only write config.toml, the proponent/challenger pair and the default roster.
    pub minimal: bool,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            target_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            force: false,
            minimal: false,
        }
    }
}

/// Generate `.debate-kit/` and return the files written.
///
/// ```text
/// .debate-kit/
/// ├── config.toml
/// ├── agents/
/// │   ├── challenger.md
/// │   ├── proponent.md
/// │   ├── summarizer.md   (unless minimal)
/// │   └── writer.md       (unless minimal)
/// └── rosters/
///     ├── default.yaml
///     └── panel.yaml      (unless minimal)
/// ```
pub async fn generate_debate_kit_structure(options: InitOptions) -> InitResult<Vec<PathBuf>> {
    let dk_dir = options.target_dir.join(CONFIG_DIR);

    if dk_dir.exists() && !options.force {
        return Err(InitError::DirectoryExists(dk_dir));
    }

    for sub in ["agents", "rosters"] {
        let path = dk_dir.join(sub);
        fs::create_dir_all(&path).map_err(|source| InitError::DirectoryCreate { path, source })?;
    }

    let templates: Vec<String> = if options.minimal {
        MINIMAL_TEMPLATES.iter().map(|t| t.to_string()).collect()
    } else {
        list_templates("")
    };

    let mut written = Vec::with_capacity(templates.len());
    for template in &templates {
        written.push(write_template_file(&dk_dir, template)?);
    }

    debug!(dir = %dk_dir.display(), files = written.len(), "debate-kit initialized");
    Ok(written)
}

fn write_template_file(dk_dir: &Path, template_path: &str) -> InitResult<PathBuf> {
    let content = get_template(template_path)
        .ok_or_else(|| InitError::TemplateNotFound(template_path.to_string()))?;

    let target_path = dk_dir.join(template_path);

    if let Some(parent) = target_path.parent() {
        fs::create_dir_all(parent).map_err(|source| InitError::DirectoryCreate {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    fs::write(&target_path, content).map_err(|source| InitError::FileWrite {
        path: target_path.clone(),
        source,
    })?;

    Ok(target_path)
}
