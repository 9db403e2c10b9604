pub mod bot_repo;
pub mod broadcast_repo;
pub mod credit_ledger;
pub mod generation_repo;
pub mod order_repo;
pub mod payment_config_repo;
pub mod plan_repo;
pub mod session_repo;
pub mod user_repo;

pub use bot_repo::BotRepository;
pub use broadcast_repo::BroadcastRepository;
pub use credit_ledger::{required_credits, CreditLedger, DebitOutcome};
pub use generation_repo::GenerationRepository;
pub use order_repo::OrderRepository;
pub use payment_config_repo::PaymentConfigRepository;
pub use plan_repo::PlanRepository;
pub use session_repo::SessionRepository;
pub use user_repo::UserRepository;
