use std::sync::Arc;

use sqlx::PgPool;

use crate::simulation::Simulator;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub simulator: Arc<Simulator>,
}
