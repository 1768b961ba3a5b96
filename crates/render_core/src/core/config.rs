//! # Render Core Configuration
//!
//! Configuration for the render thread, the draw lists and the editor features.
//! Loaded from TOML or RON through the [`Config`] trait.

use serde::{Deserialize, Serialize};

pub use crate::config::{Config, ConfigError};

/// Longest name the OS accepts for a thread on every platform we care about
const MAX_THREAD_NAME_LEN: usize = 15;

/// # Draw List Configuration
///
/// Initial capacities for the per-depth-group draw lists. These are hints only;
/// lists grow on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawListConfig {
    /// Drawing policy links reserved per draw list
    pub initial_link_capacity: usize,
    /// Instances reserved per mesh batch when it is first linked
    pub initial_instance_capacity: usize,
}

impl DrawListConfig {
    /// Create draw list configuration with default capacities
    pub fn new() -> Self {
        Self {
            initial_link_capacity: 64,
            initial_instance_capacity: 4,
        }
    }

    /// Set link capacity
    pub fn with_link_capacity(mut self, capacity: usize) -> Self {
        self.initial_link_capacity = capacity;
        self
    }

    /// Set instance capacity
    pub fn with_instance_capacity(mut self, capacity: usize) -> Self {
        self.initial_instance_capacity = capacity;
        self
    }
}

impl Default for DrawListConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// # Editor Configuration
///
/// Editor-only drawing features. Ignored when the crate is built without the
/// `editor` feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorConfig {
    /// Draw the WorldEdBackground / WorldEdForeground depth groups
    pub editor_depth_groups: bool,
    /// Link primitives with a hit proxy id into the hit-proxy draw lists
    pub hit_proxies: bool,
    /// Draw dynamic mesh elements queued on depth groups
    pub dynamic_elements: bool,
}

impl EditorConfig {
    /// Create editor configuration with every feature enabled
    pub fn new() -> Self {
        Self {
            editor_depth_groups: true,
            hit_proxies: true,
            dynamic_elements: true,
        }
    }

    /// Configuration for a game build: no editor drawing at all
    pub fn disabled() -> Self {
        Self {
            editor_depth_groups: false,
            hit_proxies: false,
            dynamic_elements: false,
        }
    }
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// # Render Core Configuration
///
/// Top-level configuration consumed by [`crate::render::RenderingThread::start`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderCoreConfig {
    /// Run a dedicated rendering thread. When false the host pumps the queue itself.
    pub threaded_rendering: bool,
    /// Name given to the rendering thread
    pub render_thread_name: String,
    /// Default log filter used by the demo binary when `RUST_LOG` is unset
    pub log_level: String,
    /// Draw list capacities
    pub draw_lists: DrawListConfig,
    /// Editor features
    pub editor: EditorConfig,
}

impl RenderCoreConfig {
    /// Create a new render core configuration
    pub fn new() -> Self {
        Self {
            threaded_rendering: true,
            render_thread_name: "RenderThread".to_string(),
            log_level: "info".to_string(),
            draw_lists: DrawListConfig::default(),
            editor: EditorConfig::default(),
        }
    }

    /// Enable or disable the dedicated rendering thread
    pub fn with_threaded_rendering(mut self, enabled: bool) -> Self {
        self.threaded_rendering = enabled;
        self
    }

    /// Set the rendering thread name
    pub fn with_render_thread_name(mut self, name: impl Into<String>) -> Self {
        self.render_thread_name = name.into();
        self
    }

    /// Set log level
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Set draw list capacities
    pub fn with_draw_lists(mut self, draw_lists: DrawListConfig) -> Self {
        self.draw_lists = draw_lists;
        self
    }

    /// Set editor features
    pub fn with_editor(mut self, editor: EditorConfig) -> Self {
        self.editor = editor;
        self
    }

    /// Editor depth groups are drawn only in editor builds with the option on
    pub fn editor_depth_groups_enabled(&self) -> bool {
        cfg!(feature = "editor") && self.editor.editor_depth_groups
    }

    /// Hit proxies are linked only in editor builds with the option on
    pub fn hit_proxies_enabled(&self) -> bool {
        cfg!(feature = "editor") && self.editor.hit_proxies
    }

    /// Dynamic mesh elements are gathered and drawn only in editor builds
    pub fn dynamic_elements_enabled(&self) -> bool {
        cfg!(feature = "editor") && self.editor.dynamic_elements
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.render_thread_name.is_empty() {
            return Err(ConfigError::Invalid("render thread name cannot be empty".to_string()));
        }

        if self.render_thread_name.len() > MAX_THREAD_NAME_LEN {
            return Err(ConfigError::Invalid(format!(
                "render thread name '{}' is longer than {} bytes",
                self.render_thread_name, MAX_THREAD_NAME_LEN
            )));
        }

        if self.log_level.parse::<log::LevelFilter>().is_err() {
            return Err(ConfigError::Invalid(format!("unknown log level '{}'", self.log_level)));
        }

        Ok(())
    }
}

impl Default for RenderCoreConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl Config for RenderCoreConfig {}
