//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the render core:
//! - Math types and operations
//! - Structural hashing
//! - Logging utilities

pub mod hash;
pub mod logging;
pub mod math;
