//! Loader for the `.debate-kit/` directory.

use crate::config::error::{ConfigError, ConfigResult};
use crate::config::models::AppConfig;
use dk_protocol::agent_models::AgentDefinition;
use dk_protocol::config_models::SessionSettings;
use dk_protocol::roster_models::Roster;
use gray_matter::engine::YAML;
use gray_matter::Matter;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Name of the configuration directory under the project root.
pub const CONFIG_DIR: &str = ".debate-kit";

/// Load and validate `.debate-kit/` under `root`.
///
/// A missing directory, or missing files inside it, yield defaults rather
/// than errors. Files that exist must parse, and the result must pass
/// [`AppConfig::validate`].
pub async fn load_config(root: &Path) -> ConfigResult<AppConfig> {
    let dk_dir = root.join(CONFIG_DIR);

    if !dk_dir.exists() {
        debug!(dir = %dk_dir.display(), "no configuration directory, using defaults");
        return Ok(AppConfig::default());
    }

    let config = AppConfig {
        settings: load_settings(&dk_dir)?,
        agents: load_agents(&dk_dir)?,
        rosters: load_rosters(&dk_dir)?,
    };
    config.validate()?;

    debug!(
        agents = config.agents.len(),
        rosters = config.rosters.len(),
        "configuration loaded"
    );
    Ok(config)
}

fn read(path: &Path) -> ConfigResult<String> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
        path: path.to_path_buf(),
        source,
    })
}

/// Files directly inside `dir` with one of `extensions`, in name order.
fn files_with_extension(dir: &Path, extensions: &[&str]) -> ConfigResult<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|source| ConfigError::DirectoryWalk {
            path: dir.to_path_buf(),
            source,
        })?;

        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| extensions.contains(&ext));
        if matches && entry.file_type().is_file() {
            files.push(path.to_path_buf());
        }
    }
    Ok(files)
}

fn load_settings(dk_dir: &Path) -> ConfigResult<SessionSettings> {
    let config_path = dk_dir.join("config.toml");

    if !config_path.exists() {
        return Ok(SessionSettings::default());
    }

    let content = read(&config_path)?;
    toml::from_str(&content).map_err(|source| ConfigError::TomlParse {
        path: config_path,
        source,
    })
}

fn load_agents(dk_dir: &Path) -> ConfigResult<Vec<AgentDefinition>> {
    let matter = Matter::<YAML>::new();
    let mut agents = Vec::new();

    for path in files_with_extension(&dk_dir.join("agents"), &["md"])? {
        let content = read(&path)?;
        let result = matter.parse(&content);

        let mut agent: AgentDefinition = result
            .data
            .ok_or_else(|| ConfigError::MarkdownParse {
                path: path.clone(),
                reason: "Missing YAML front matter".to_string(),
            })?
            .deserialize()
            .map_err(|e| ConfigError::MarkdownParse {
                path: path.clone(),
                reason: format!("Failed to deserialize front matter: {e}"),
            })?;

        agent.instructions = result.content.trim().to_string();
        agents.push(agent);
    }

    Ok(agents)
}

fn load_rosters(dk_dir: &Path) -> ConfigResult<Vec<Roster>> {
    let mut rosters = Vec::new();

    for path in files_with_extension(&dk_dir.join("rosters"), &["yaml", "yml"])? {
        let content = read(&path)?;
        let roster: Roster =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::YamlParse {
                path: path.clone(),
                source,
            })?;
        rosters.push(roster);
    }

    Ok(rosters)
}
