use axum::Router;
use std::sync::Arc;

pub mod compose;
pub mod config;
pub mod db;
pub mod errors;
pub mod generation;
pub mod jobs;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod schema;
pub mod services;
pub mod shutdown;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
pub mod validation;

use generation::GenerationService;

pub trait AppState: Clone + Send + Sync + 'static {
    fn generation(&self) -> &GenerationService;
}

#[derive(Clone)]
pub struct DefaultAppState {
    generation: Arc<GenerationService>,
}

impl DefaultAppState {
    pub fn new(generation: GenerationService) -> Self {
        Self {
            generation: Arc::new(generation),
        }
    }
}

impl AppState for DefaultAppState {
    fn generation(&self) -> &GenerationService {
        &self.generation
    }
}

pub fn create_app<S: AppState>(state: S) -> Router {
    routes::create_router().with_state(state)
}
