use std::sync::Arc;

use application::{ChatService, EventBus, NotificationService, PresenceTracker};
use domain::SessionRepository;

#[derive(Clone)]
pub struct AppState {
    pub chat_service: Arc<ChatService>,
    pub notification_service: Arc<NotificationService>,
    pub presence: Arc<dyn PresenceTracker>,
    pub bus: Arc<dyn EventBus>,
    pub sessions: Arc<dyn SessionRepository>,
}
