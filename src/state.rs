use std::sync::Arc;

use crate::broker::Broker;

// app's shared state
#[derive(Clone)]
pub struct AppState {
    pub broker: Arc<Broker>,
}

impl AppState {
    pub fn new(broker: Broker) -> Self {
        Self {
            broker: Arc::new(broker),
        }
    }
}
