//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use std::sync::Arc;

use commitment_core::manager::CommitmentManager;
use commitment_core::ports::OcrService;
use commitment_core::recap::RecapAggregator;

use crate::config::Config;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<CommitmentManager>,
    pub recaps: Arc<RecapAggregator>,
    pub ocr: Arc<dyn OcrService>,
    pub config: Arc<Config>,
}
