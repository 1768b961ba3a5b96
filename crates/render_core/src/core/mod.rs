//! # Core Module
//!
//! Shared configuration for the render core.
//!
//! ## Organization
//!
//! - **Config**: Render core configuration (threading, draw lists, editor features)

pub mod config;

pub use config::{Config, ConfigError, DrawListConfig, EditorConfig, RenderCoreConfig};
