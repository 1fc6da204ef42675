use std::sync::Arc;

use axum::extract::FromRef;

use crate::RelayHub;

#[derive(Clone, FromRef)]
pub struct ServerContext {
    pub hub: Arc<RelayHub>,
}
