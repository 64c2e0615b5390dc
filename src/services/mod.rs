//! # Service definitions and the services-file loader.
//!
//! - [`ServiceSpec`] - immutable declaration of one supervisable unit
//! - [`Hooks`], [`HookKind`] - inter-service sequencing hooks
//! - [`load`], [`parse_str`] - YAML loader producing `name → ServiceSpec`
//!
//! ## File format
//! ```yaml
//! services:
//!   migrate:
//!     command: ./migrate.sh
//!   api:
//!     cwd: ${HOME}/src/api
//!     command: cargo run --bin api
//!     environs: { PORT: 8080 }
//!     hooks:
//!       wait: [migrate]
//!       kill: [watcher]
//!   watcher:
//!     command: ./watch.sh
//!     ignore_failures: true
//! ```

mod loader;
mod spec;

pub use loader::{load, parse_str, DEFAULT_CONFIG_PATH};
pub use spec::{HookKind, Hooks, ServiceSpec};
