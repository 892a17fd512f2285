//! Admin HTTP handlers.

mod cache;
mod health;
mod pipeline;

pub use cache::{cache_clear, cache_force_auto_clear, cache_stats};
pub use health::{livez, readyz, version};
pub use pipeline::{pipeline_stats, settings_changed};
