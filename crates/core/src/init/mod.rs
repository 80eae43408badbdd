//! Scaffolding for a new `.debate-kit/` directory.
//!
//! ```no_run
//! use dk_core::init::{generate_debate_kit_structure, InitOptions};
//! use std::path::PathBuf;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let options = InitOptions {
//!     target_dir: PathBuf::from("."),
//!     force: false,
//!     minimal: false,
//! };
//!
//! let written = generate_debate_kit_structure(options).await?;
//! println!("wrote {} files", written.len());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod generator;
pub mod templates;

pub use error::{InitError, InitResult};
pub use generator::{generate_debate_kit_structure, InitOptions};
pub use templates::{get_template, list_templates};
