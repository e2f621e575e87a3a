use std::sync::Arc;

use castray_feed::FeedEngine;

use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<FeedEngine>,
    pub metrics: Arc<Metrics>,
}
