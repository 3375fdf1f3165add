use std::sync::Arc;

use crate::config::Config;
use crate::worker::Worker;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub worker: Worker,
}

impl AppState {
    pub fn new(config: Config, worker: Worker) -> Self {
        Self {
            config: Arc::new(config),
            worker,
        }
    }
}
