pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod fetch;
pub mod model;
pub mod notification;
pub mod pipeline;
pub mod queue;
pub mod script;

use std::sync::Arc;

use crate::pipeline::BuildPipeline;

pub struct AppState {
    pub pipeline: Arc<BuildPipeline>,
}

pub type SharedState = Arc<AppState>;
