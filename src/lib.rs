pub mod admin;
pub mod config;
pub mod content;
pub mod error;
pub mod framework;
pub mod fs_util;
pub mod history;
pub mod metacard;
pub mod mime;
pub mod operation;
pub mod ops;
pub mod output;
pub mod plugin;
pub mod policy;
pub mod providers;
pub mod query;
pub mod resource;
pub mod security;
pub mod source;
pub mod storage;
pub mod store;
pub mod support;
pub mod transform;

pub use error::{CatalogError, PluginError};
pub use framework::{CatalogFramework, FrameworkProperties, FrameworkSettings};
