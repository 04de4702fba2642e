//! Application layer module
//!
//! This module hosts the translation progress controller and the workbench
//! facade that runs its event loop.

pub mod controller;
pub mod workbench;

// Re-export commonly used items
pub use controller::{StreamSignal, TranslationProgressController};
pub use workbench::Workbench;
