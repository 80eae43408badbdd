//! Configuration loading and validation.
//!
//! Everything lives under `.debate-kit/` in the project root:
//!
//! ```text
//! .debate-kit/
//! ├── config.toml        session settings
//! ├── agents/*.md        agent definitions (YAML front matter + instructions)
//! └── rosters/*.yaml     named agent lineups
//! ```

pub mod error;
pub mod loader;
pub mod models;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_config, CONFIG_DIR};
pub use models::AppConfig;
