pub mod ai_model;
pub mod bot;
pub mod broadcast;
pub mod order;
pub mod payment_config;
pub mod plan;
pub mod session;
pub mod user;

pub use ai_model::AiModel;
pub use bot::{BotConfig, BotSettings};
pub use broadcast::{Broadcast, BroadcastStatus};
pub use order::{Order, OrderStatus};
pub use payment_config::BotPaymentConfig;
pub use plan::Plan;
pub use session::ChatState;
pub use user::User;
