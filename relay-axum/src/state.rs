use std::sync::Arc;

use relay_pipe::RequestCoordinator;

#[derive(Clone)]
pub struct RelayAxumState {
    pub coordinator: Arc<RequestCoordinator>,
}

impl RelayAxumState {
    pub fn new(coordinator: RequestCoordinator) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
        }
    }
}
