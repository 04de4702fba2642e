//! Interp Workbench - translation workbench client
//!
//! Headless client for the legacy-script translation service: upload and
//! manage scripts, run server-side translation jobs, and follow their
//! streamed progress with support for cancellation.

// Module declarations
pub mod application;
pub mod domain;
pub mod infrastructure;

// Re-export the crate's main entry points
pub use application::{TranslationProgressController, Workbench};
pub use domain::{
    JobUpdate, TranslationJob, TranslationPhase, TranslationProgress, TranslationResult,
    TranslationStreamEvent,
};
pub use infrastructure::{Bucket, ConfigManager, WorkbenchApi};
