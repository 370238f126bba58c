use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::gateway::PatientResponder;
use crate::services::messaging::outbox::Outbox;
use crate::services::runs::Scheduler;

pub struct AppState {
    pub config: AppConfig,
    pub scheduler: Scheduler,
    pub outbox: Arc<Outbox>,
    pub patient: Arc<dyn PatientResponder>,
}
