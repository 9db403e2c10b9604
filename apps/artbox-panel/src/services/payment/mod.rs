use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{error, info, warn};

use artbox_db::models::{Order, Plan};
use artbox_db::repositories::{
    BotRepository, CreditLedger, OrderRepository, PaymentConfigRepository, PlanRepository,
    UserRepository,
};

use crate::services::notification_service::NotificationService;

pub mod heleket;
pub mod lava;
pub mod wata;

pub mod provider {
    pub const LAVA_RU: &str = "lava_ru";
    pub const WATA: &str = "wata";
    pub const HELEKET: &str = "heleket";
    /// In-chat native rail; no remote invoice, the Telegram invoice payload
    /// carries the order id.
    pub const TELEGRAM_STARS: &str = "telegram_stars";
}

/// Common shape every provider callback is normalized into before it may
/// touch an order. Per-provider field names stay inside the adapter modules.
#[derive(Debug, Clone)]
pub struct ProviderCallback {
    pub internal_id: Option<i64>,
    pub external_id: Option<String>,
    pub paid: bool,
    /// Untouched payload, persisted on the order for audit.
    pub raw: Value,
}

impl ProviderCallback {
    pub fn has_lookup_key(&self) -> bool {
        self.internal_id.is_some() || self.external_id.is_some()
    }
}

/// Successful remote invoice creation.
#[derive(Debug, Clone)]
pub struct RemoteInvoice {
    pub url: String,
    pub external_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Checkout {
    pub order_id: i64,
    pub url: String,
}

#[derive(Debug)]
pub enum SettleOutcome {
    Settled {
        order_id: i64,
        credits_added: i64,
        new_balance: i64,
    },
    /// The order was already paid; no ledger mutation happened.
    AlreadySettled,
    /// The callback did not assert payment; nothing was looked up.
    NotPaid,
    /// No order matches the callback's ids. The webhook is still
    /// acknowledged; this outcome exists for logging.
    OrderNotFound,
}

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("plan not found")]
    PlanNotFound,
    #[error("payment provider {0} is disabled or not configured for this bot")]
    ProviderDisabled(String),
    #[error("remote invoice creation failed")]
    CreationFailed(#[source] anyhow::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Creates remote invoices for one provider. Implementations parse their own
/// credentials JSON and speak their own wire dialect.
#[async_trait]
pub trait PaymentAdapter: Send + Sync {
    async fn create_invoice(
        &self,
        http: &reqwest::Client,
        order: &Order,
        app_url: &str,
    ) -> Result<RemoteInvoice>;

    fn name(&self) -> &str;
}

/// Order creation plus idempotent settlement. The settlement path is shared
/// by every provider webhook, the Telegram Stars rail and the manual admin
/// approve; there is deliberately no second way to credit a paid order.
#[derive(Clone)]
pub struct PaymentService {
    pool: PgPool,
    orders: OrderRepository,
    plans: PlanRepository,
    configs: PaymentConfigRepository,
    notifications: NotificationService,
    http: reqwest::Client,
    app_url: String,
}

impl PaymentService {
    pub fn new(pool: PgPool, app_url: String) -> Self {
        Self {
            orders: OrderRepository::new(pool.clone()),
            plans: PlanRepository::new(pool.clone()),
            configs: PaymentConfigRepository::new(pool.clone()),
            notifications: NotificationService::new(
                BotRepository::new(pool.clone()),
                UserRepository::new(pool.clone()),
            ),
            http: reqwest::Client::new(),
            app_url,
            pool,
        }
    }

    /// Create a pending order and a remote invoice for it. The order row is
    /// written before the provider is contacted; if the provider errors the
    /// pending row stays behind, inert, so the user can retry or an admin
    /// can approve it by hand.
    pub async fn create_order(
        &self,
        bot_id: i64,
        user_id: i64,
        plan_id: i64,
        provider: &str,
    ) -> Result<Checkout, PaymentError> {
        let plan = self
            .plans
            .get_by_id(plan_id)
            .await?
            .ok_or(PaymentError::PlanNotFound)?;

        let config = self
            .configs
            .get_enabled(bot_id, provider)
            .await?
            .ok_or_else(|| PaymentError::ProviderDisabled(provider.to_string()))?;

        let adapter = adapter_for(provider, &config.credentials)
            .map_err(|_| PaymentError::ProviderDisabled(provider.to_string()))?;

        let order = self
            .orders
            .create(bot_id, user_id, plan.id, plan.price, &plan.currency, provider)
            .await?;

        let invoice = adapter
            .create_invoice(&self.http, &order, &self.app_url)
            .await
            .map_err(|e| {
                error!("[{}] invoice creation failed for order {}: {e:#}", provider, order.id);
                PaymentError::CreationFailed(e)
            })?;

        if let Some(external_id) = invoice.external_id.as_deref() {
            self.orders.set_external_id(order.id, external_id).await?;
        }

        info!(
            "[{}] order {} created for bot {} user {} plan {}",
            provider, order.id, bot_id, user_id, plan.id
        );

        Ok(Checkout {
            order_id: order.id,
            url: invoice.url,
        })
    }

    /// Create a pending order for the Telegram Stars rail. No remote call;
    /// the caller issues the in-chat invoice with this order's id as the
    /// payload.
    pub async fn create_stars_order(
        &self,
        bot_id: i64,
        user_id: i64,
        plan: &Plan,
    ) -> Result<Order, PaymentError> {
        let stars = plan
            .stars_price
            .ok_or_else(|| PaymentError::ProviderDisabled(provider::TELEGRAM_STARS.into()))?;

        let order = self
            .orders
            .create(
                bot_id,
                user_id,
                plan.id,
                stars as f64,
                "XTR",
                provider::TELEGRAM_STARS,
            )
            .await?;
        Ok(order)
    }

    /// Names of the providers a bot can currently charge through, in the
    /// order the checkout keyboard shows them.
    pub async fn enabled_providers(&self, bot_id: i64) -> Result<Vec<String>> {
        let configs = self.configs.list_enabled(bot_id).await?;
        Ok(configs.into_iter().map(|c| c.provider).collect())
    }

    /// Idempotent settlement. Only callbacks that assert payment and carry
    /// an id get past the precondition; the order is then resolved, the
    /// pending -> paid transition claimed with a conditional UPDATE and the
    /// plan's bundle credited inside the same transaction. A duplicate
    /// delivery, a provider/admin race or a replayed callback all land on
    /// `AlreadySettled` and leave the ledger alone.
    pub async fn settle(&self, callback: ProviderCallback) -> Result<SettleOutcome> {
        if let Some(outcome) = reject_unsettleable(&callback) {
            return Ok(outcome);
        }

        let Some(order) = self
            .orders
            .find_for_settlement(callback.internal_id, callback.external_id.as_deref())
            .await?
        else {
            return Ok(SettleOutcome::OrderNotFound);
        };

        if order.is_paid() {
            return Ok(SettleOutcome::AlreadySettled);
        }

        let plan = self
            .plans
            .get_by_id(order.plan_id)
            .await?
            .ok_or_else(|| anyhow!("order {} references missing plan {}", order.id, order.plan_id))?;

        let mut tx = self.pool.begin().await.context("Failed to open settlement transaction")?;

        let Some(order) = OrderRepository::claim_paid_in_tx(
            &mut tx,
            order.id,
            callback.external_id.as_deref(),
            &callback.raw,
        )
        .await?
        else {
            // Lost the claim to a concurrent settlement.
            return Ok(SettleOutcome::AlreadySettled);
        };

        let new_balance =
            CreditLedger::credit_in_tx(&mut tx, order.bot_id, order.user_id, plan.credits).await?;

        tx.commit().await.context("Failed to commit settlement")?;

        info!(
            "Order {} settled: +{} credits for bot {} user {}, balance {}",
            order.id, plan.credits, order.bot_id, order.user_id, new_balance
        );

        self.spawn_settlement_notice(order.clone(), plan.credits, new_balance);

        Ok(SettleOutcome::Settled {
            order_id: order.id,
            credits_added: plan.credits,
            new_balance,
        })
    }

    /// Best-effort user notification, detached from the settlement request.
    /// A blocked or deleted chat must never affect settlement correctness.
    fn spawn_settlement_notice(&self, order: Order, credits_added: i64, new_balance: i64) {
        let notifications = self.notifications.clone();
        tokio::spawn(async move {
            if let Err(e) = notifications
                .notify_settled(&order, credits_added, new_balance)
                .await
            {
                warn!("Settlement notice for order {} not delivered: {e:#}", order.id);
            }
        });
    }
}

/// Settlement precondition, checked before any row is touched. The success
/// predicate lives here rather than at the webhook call sites, so a future
/// caller cannot settle an unpaid callback by forgetting a check.
fn reject_unsettleable(callback: &ProviderCallback) -> Option<SettleOutcome> {
    if !callback.paid {
        return Some(SettleOutcome::NotPaid);
    }
    if !callback.has_lookup_key() {
        return Some(SettleOutcome::OrderNotFound);
    }
    None
}

fn adapter_for(provider_name: &str, credentials: &Value) -> Result<Box<dyn PaymentAdapter>> {
    match provider_name {
        provider::LAVA_RU => Ok(Box::new(lava::LavaAdapter::from_credentials(credentials)?)),
        provider::WATA => Ok(Box::new(wata::WataAdapter::from_credentials(credentials)?)),
        provider::HELEKET => Ok(Box::new(heleket::HeleketAdapter::from_credentials(
            credentials,
        )?)),
        other => Err(anyhow!("unknown payment provider: {other}")),
    }
}

/// Providers are inconsistent about whether ids arrive as JSON numbers or
/// strings; accept both.
pub(crate) fn id_as_i64(value: &Option<Value>) -> Option<i64> {
    match value {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn id_as_string(value: &Option<Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ids_accept_both_json_shapes() {
        assert_eq!(id_as_i64(&Some(json!(42))), Some(42));
        assert_eq!(id_as_i64(&Some(json!("42"))), Some(42));
        assert_eq!(id_as_i64(&Some(json!("not-a-number"))), None);
        assert_eq!(id_as_i64(&None), None);

        assert_eq!(id_as_string(&Some(json!("abc"))), Some("abc".to_string()));
        assert_eq!(id_as_string(&Some(json!(7))), Some("7".to_string()));
        assert_eq!(id_as_string(&Some(json!(""))), None);
    }

    #[test]
    fn callback_without_any_id_has_no_lookup_key() {
        let cb = ProviderCallback {
            internal_id: None,
            external_id: None,
            paid: true,
            raw: json!({}),
        };
        assert!(!cb.has_lookup_key());
    }

    #[test]
    fn settlement_rejects_unpaid_and_keyless_callbacks() {
        let unpaid = ProviderCallback {
            internal_id: Some(1),
            external_id: None,
            paid: false,
            raw: json!({}),
        };
        assert!(matches!(
            reject_unsettleable(&unpaid),
            Some(SettleOutcome::NotPaid)
        ));

        let keyless = ProviderCallback {
            internal_id: None,
            external_id: None,
            paid: true,
            raw: json!({}),
        };
        assert!(matches!(
            reject_unsettleable(&keyless),
            Some(SettleOutcome::OrderNotFound)
        ));

        let settleable = ProviderCallback {
            internal_id: Some(1),
            external_id: None,
            paid: true,
            raw: json!({}),
        };
        assert!(reject_unsettleable(&settleable).is_none());
    }
}
