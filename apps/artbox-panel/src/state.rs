use std::sync::Arc;

use sqlx::PgPool;

use artbox_db::repositories::{
    BotRepository, CreditLedger, GenerationRepository, PlanRepository, SessionRepository,
    UserRepository,
};

use crate::services::broadcast_service::BroadcastService;
use crate::services::generation::GenerationGateway;
use crate::services::payment::PaymentService;

#[derive(Clone)]
pub struct AppConfig {
    /// Public base URL without trailing slash.
    pub app_url: String,
    pub admin_token: String,
}

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub bots: BotRepository,
    pub users: UserRepository,
    pub plans: PlanRepository,
    pub ledger: CreditLedger,
    pub sessions: SessionRepository,
    pub generations: GenerationRepository,
    pub payments: PaymentService,
    pub broadcasts: BroadcastService,
    pub gateway: Arc<dyn GenerationGateway>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(pool: PgPool, gateway: Arc<dyn GenerationGateway>, config: AppConfig) -> Self {
        Self {
            bots: BotRepository::new(pool.clone()),
            users: UserRepository::new(pool.clone()),
            plans: PlanRepository::new(pool.clone()),
            ledger: CreditLedger::new(pool.clone()),
            sessions: SessionRepository::new(pool.clone()),
            generations: GenerationRepository::new(pool.clone()),
            payments: PaymentService::new(pool.clone(), config.app_url.clone()),
            broadcasts: BroadcastService::new(pool.clone()),
            gateway,
            config,
            pool,
        }
    }
}
