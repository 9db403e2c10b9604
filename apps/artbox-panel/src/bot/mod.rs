use anyhow::{anyhow, Context, Result};
use serde_json::json;
use teloxide::prelude::*;
use teloxide::types::{
    CallbackQuery, InputFile, LabeledPrice, Message, MessageId, ParseMode, PreCheckoutQuery,
    Update, UpdateKind,
};
use tracing::{info, warn};

use artbox_db::models::{BotConfig, ChatState};
use artbox_db::repositories::{required_credits, DebitOutcome};

use crate::services::generation::GenerationError;
use crate::services::payment::{provider, PaymentError, ProviderCallback, SettleOutcome};
use crate::state::AppState;

pub mod keyboards;

/// Free credits granted when a user first opens a bot.
const INITIAL_GRANT: i64 = 1;
/// Fallback model for bots without an explicit assignment.
const DEFAULT_MODEL_SLUG: &str = "black-forest-labs/flux-dev";
const DEFAULT_MODEL_COST_USD: f64 = 0.01;

/// Per-update driver for one rented bot. Constructed fresh for every
/// webhook delivery; all durable state lives in the database, so two
/// replicas can process the same bot.
pub struct BotService {
    state: AppState,
    cfg: BotConfig,
    bot: Bot,
}

impl BotService {
    pub fn new(state: AppState, cfg: BotConfig) -> Self {
        let bot = Bot::new(&cfg.token);
        Self { state, cfg, bot }
    }

    pub async fn handle_update(&self, update: Update) -> Result<()> {
        match update.kind {
            UpdateKind::Message(msg) => self.handle_message(msg).await,
            UpdateKind::CallbackQuery(q) => self.handle_callback(q).await,
            UpdateKind::PreCheckoutQuery(q) => self.handle_pre_checkout(q).await,
            _ => Ok(()),
        }
    }

    async fn handle_message(&self, msg: Message) -> Result<()> {
        if let Some(payment) = msg.successful_payment() {
            return self
                .handle_successful_payment(&msg, &payment.invoice_payload)
                .await;
        }

        let Some(text) = msg.text() else {
            return Ok(());
        };

        if text.starts_with("/start") {
            self.handle_start(&msg).await
        } else if text.starts_with('/') {
            // Unknown command; ignore rather than burn a prompt on it.
            Ok(())
        } else {
            self.handle_text(&msg, text).await
        }
    }

    /// Registration is idempotent: the identity upsert refreshes names, the
    /// balance row is created at most once, and the welcome grant is never
    /// re-applied on a repeat /start.
    async fn handle_start(&self, msg: &Message) -> Result<()> {
        let from = msg.from.as_ref().context("Message without sender")?;

        let full_name = match &from.last_name {
            Some(last) => format!("{} {}", from.first_name, last),
            None => from.first_name.clone(),
        };
        let user = self
            .state
            .users
            .upsert(from.id.0 as i64, from.username.as_deref(), Some(&full_name))
            .await?;

        self.state
            .ledger
            .ensure(self.cfg.id, user.id, INITIAL_GRANT)
            .await?;
        self.state
            .sessions
            .set_state(self.cfg.id, msg.chat.id.0, ChatState::Idle)
            .await?;

        let settings = self.cfg.settings();
        let welcome = settings.welcome_text.clone().unwrap_or_else(|| {
            "👋 <b>Hi! I am an AI artist.</b>\nI turn your words into pictures.\n\n\
             Tap the button below and describe what to draw!"
                .to_string()
        });

        self.bot
            .send_message(msg.chat.id, welcome)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboards::main_menu(&settings))
            .await?;
        Ok(())
    }

    async fn handle_text(&self, msg: &Message, text: &str) -> Result<()> {
        let from = msg.from.as_ref().context("Message without sender")?;
        let Some(user) = self
            .state
            .users
            .get_by_telegram_id(from.id.0 as i64)
            .await?
        else {
            // Text before /start: nudge registration instead of failing.
            self.bot
                .send_message(msg.chat.id, "Please press /start first 🙌")
                .await?;
            return Ok(());
        };

        match self
            .state
            .sessions
            .get_state(self.cfg.id, msg.chat.id.0)
            .await?
        {
            ChatState::AwaitingPrompt => self.handle_prompt(msg, user.id, text).await,
            ChatState::Idle => {
                let settings = self.cfg.settings();
                self.bot
                    .send_message(
                        msg.chat.id,
                        "Tap 🎨 <b>Start drawing</b> and I'll be all ears.",
                    )
                    .parse_mode(ParseMode::Html)
                    .reply_markup(keyboards::main_menu(&settings))
                    .await?;
                Ok(())
            }
        }
    }

    /// One prompt, one picture, one debit. The debit happens after a
    /// successful render, so a backend failure never costs the user a
    /// credit; the pre-check keeps obviously broke users from waiting out a
    /// render they cannot pay for.
    async fn handle_prompt(&self, msg: &Message, user_id: i64, prompt: &str) -> Result<()> {
        let (model_slug, cost_usd) = self.resolve_model().await?;
        let cost = required_credits(cost_usd);

        let available = self.state.ledger.balance(self.cfg.id, user_id).await?;
        if available < cost {
            self.state
                .sessions
                .set_state(self.cfg.id, msg.chat.id.0, ChatState::Idle)
                .await?;
            self.bot
                .send_message(
                    msg.chat.id,
                    format!(
                        "😔 <b>Not enough credits.</b>\n\n\
                         This generation costs <b>{cost}</b>, you have <b>{available}</b>.\n\
                         Top up to keep creating!"
                    ),
                )
                .parse_mode(ParseMode::Html)
                .reply_markup(keyboards::buy_credits_button())
                .await?;
            return Ok(());
        }

        let status = self
            .bot
            .send_message(
                msg.chat.id,
                "🎨 <b>Drawing...</b>\n<i>This takes about 5-10 seconds</i>",
            )
            .parse_mode(ParseMode::Html)
            .await?;

        match self.state.gateway.render(&model_slug, prompt).await {
            Ok(image_url) => {
                let balance = match self.state.ledger.debit(self.cfg.id, user_id, cost).await? {
                    DebitOutcome::Ok { new_balance } => new_balance,
                    DebitOutcome::InsufficientCredit { available } => {
                        // A settlement-vs-spend race drained the balance
                        // mid-render. The image is already paid for upstream;
                        // deliver it and show what is actually left.
                        warn!(
                            "Balance drained under render for bot {} user {}",
                            self.cfg.id, user_id
                        );
                        available
                    }
                };

                self.state
                    .generations
                    .append(self.cfg.id, user_id, prompt, Some(&image_url), true)
                    .await?;

                let photo_url = url::Url::parse(&image_url)
                    .with_context(|| format!("Backend returned an invalid URL: {image_url}"))?;
                self.bot
                    .send_photo(msg.chat.id, InputFile::url(photo_url))
                    .caption(format!("✅ Done! Credits left: {balance}"))
                    .await?;
                let _ = self.bot.delete_message(msg.chat.id, status.id).await;

                self.state
                    .sessions
                    .set_state(self.cfg.id, msg.chat.id.0, ChatState::Idle)
                    .await?;
            }
            Err(e) => {
                self.state
                    .generations
                    .append(self.cfg.id, user_id, prompt, None, false)
                    .await?;

                // The session stays in AwaitingPrompt: the next text is
                // treated as a fresh attempt without re-tapping the menu.
                let text = match &e {
                    GenerationError::ContentPolicy => {
                        "🚫 <b>This prompt is not allowed.</b>\nTry describing something else."
                    }
                    GenerationError::InvalidParams(_) => {
                        "❌ <b>Could not process this prompt.</b>\nTry rephrasing it."
                    }
                    GenerationError::Transient(_) => {
                        "❌ <b>Generation failed.</b>\nPlease try again in a minute."
                    }
                };
                warn!(
                    "Generation failed for bot {} user {}: {e}",
                    self.cfg.id, user_id
                );
                self.bot
                    .edit_message_text(msg.chat.id, status.id, text)
                    .parse_mode(ParseMode::Html)
                    .await?;
            }
        }
        Ok(())
    }

    async fn resolve_model(&self) -> Result<(String, f64)> {
        match self.state.bots.get_ai_model(&self.cfg).await? {
            Some(model) => Ok((model.slug, model.cost_usd)),
            None => Ok((DEFAULT_MODEL_SLUG.to_string(), DEFAULT_MODEL_COST_USD)),
        }
    }

    async fn handle_callback(&self, q: CallbackQuery) -> Result<()> {
        let Some(data) = q.data.clone() else {
            let _ = self.bot.answer_callback_query(q.id.clone()).await;
            return Ok(());
        };
        let Some(message) = q.message.clone() else {
            let _ = self.bot.answer_callback_query(q.id.clone()).await;
            return Ok(());
        };
        let chat_id = message.chat().id;
        let message_id = message.id();

        match data.as_str() {
            "main_menu" => {
                let settings = self.cfg.settings();
                let welcome = settings
                    .welcome_text
                    .clone()
                    .unwrap_or_else(|| "Main menu".to_string());
                self.state
                    .sessions
                    .set_state(self.cfg.id, chat_id.0, ChatState::Idle)
                    .await?;
                self.bot
                    .edit_message_text(chat_id, message_id, welcome)
                    .parse_mode(ParseMode::Html)
                    .reply_markup(keyboards::main_menu(&settings))
                    .await?;
            }
            "start_gen" => {
                self.state
                    .sessions
                    .set_state(self.cfg.id, chat_id.0, ChatState::AwaitingPrompt)
                    .await?;
                self.bot
                    .edit_message_text(
                        chat_id,
                        message_id,
                        "✍️ <b>Describe what to draw.</b>\nThe more detail, the better the result.",
                    )
                    .parse_mode(ParseMode::Html)
                    .reply_markup(keyboards::back_to_menu())
                    .await?;
            }
            "profile" => {
                let user = self.require_user(&q.from).await?;
                let balance = self.state.ledger.balance(self.cfg.id, user.id).await?;
                let text = format!(
                    "👤 <b>Your profile</b>\n\n\
                     🆔 ID: <code>{}</code>\n\
                     🎨 Credits left: <b>{balance}</b>",
                    user.telegram_id
                );
                self.bot
                    .edit_message_text(chat_id, message_id, text)
                    .parse_mode(ParseMode::Html)
                    .reply_markup(keyboards::buy_credits_button())
                    .await?;
            }
            "buy_credits" => {
                let plans = self.state.plans.get_active_for_bot(self.cfg.id).await?;
                if plans.is_empty() {
                    self.bot
                        .answer_callback_query(q.id.clone())
                        .text("Plans are temporarily unavailable")
                        .show_alert(true)
                        .await?;
                    return Ok(());
                }
                self.bot
                    .edit_message_text(chat_id, message_id, "👇 <b>Pick a credit bundle:</b>")
                    .parse_mode(ParseMode::Html)
                    .reply_markup(keyboards::plans_keyboard(&plans))
                    .await?;
            }
            _ if data.starts_with("select_plan:") => {
                self.show_providers(&data, chat_id, message_id, &q).await?;
            }
            _ if data.starts_with("pay:") => {
                self.start_checkout(&data, chat_id, message_id, &q).await?;
            }
            _ if data.starts_with("paystars:") => {
                self.start_stars_checkout(&data, chat_id, message_id, &q)
                    .await?;
            }
            other => {
                info!("Unhandled callback '{}' for bot {}", other, self.cfg.id);
            }
        }

        let _ = self.bot.answer_callback_query(q.id).await;
        Ok(())
    }

    async fn show_providers(
        &self,
        data: &str,
        chat_id: ChatId,
        message_id: MessageId,
        q: &CallbackQuery,
    ) -> Result<()> {
        let plan_id: i64 = data
            .strip_prefix("select_plan:")
            .unwrap_or_default()
            .parse()
            .context("Bad plan id in callback data")?;
        let Some(plan) = self.state.plans.get_by_id(plan_id).await? else {
            self.bot
                .answer_callback_query(q.id.clone())
                .text("Plan not found")
                .show_alert(true)
                .await?;
            return Ok(());
        };

        let providers: Vec<String> = self
            .state
            .payments
            .enabled_providers(self.cfg.id)
            .await?;
        let stars_enabled = plan.stars_price.is_some();

        if providers.is_empty() && !stars_enabled {
            self.bot
                .answer_callback_query(q.id.clone())
                .text("Payment methods are not configured")
                .show_alert(true)
                .await?;
            return Ok(());
        }

        let text = format!(
            "💳 Bundle: <b>{}</b>\nPrice: <b>{} {}</b>\n\nPick a payment method:",
            plan.name, plan.price, plan.currency
        );
        self.bot
            .edit_message_text(chat_id, message_id, text)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboards::providers_keyboard(&plan, &providers, stars_enabled))
            .await?;
        Ok(())
    }

    async fn start_checkout(
        &self,
        data: &str,
        chat_id: ChatId,
        message_id: MessageId,
        q: &CallbackQuery,
    ) -> Result<()> {
        let rest = data.strip_prefix("pay:").unwrap_or_default();
        let (plan_raw, provider_name) = rest
            .split_once(':')
            .ok_or_else(|| anyhow!("Bad checkout callback data: {data}"))?;
        let plan_id: i64 = plan_raw.parse().context("Bad plan id in callback data")?;

        let user = self.require_user(&q.from).await?;

        let _ = self
            .bot
            .answer_callback_query(q.id.clone())
            .text("⏳ Creating your invoice...")
            .await;

        match self
            .state
            .payments
            .create_order(self.cfg.id, user.id, plan_id, provider_name)
            .await
        {
            Ok(checkout) => {
                self.bot
                    .edit_message_text(
                        chat_id,
                        message_id,
                        "✅ <b>Invoice created!</b>\n\n\
                         Credits are added automatically within a few minutes of payment.",
                    )
                    .parse_mode(ParseMode::Html)
                    .reply_markup(keyboards::checkout_keyboard(&checkout.url))
                    .await?;
            }
            Err(PaymentError::Internal(e)) => return Err(e),
            Err(e) => {
                warn!(
                    "Checkout via {} failed for bot {}: {e}",
                    provider_name, self.cfg.id
                );
                self.bot
                    .edit_message_text(
                        chat_id,
                        message_id,
                        "❌ <b>Payment system error.</b>\nTry again later or pick another method.",
                    )
                    .parse_mode(ParseMode::Html)
                    .reply_markup(keyboards::back_to_menu())
                    .await?;
            }
        }
        Ok(())
    }

    /// Stars checkout never leaves the chat: a pending order is written and
    /// the native invoice carries its id as payload. Settlement happens when
    /// the successful-payment message comes back.
    async fn start_stars_checkout(
        &self,
        data: &str,
        chat_id: ChatId,
        message_id: MessageId,
        q: &CallbackQuery,
    ) -> Result<()> {
        let plan_id: i64 = data
            .strip_prefix("paystars:")
            .unwrap_or_default()
            .parse()
            .context("Bad plan id in callback data")?;
        let Some(plan) = self.state.plans.get_by_id(plan_id).await? else {
            self.bot
                .answer_callback_query(q.id.clone())
                .text("Plan not found")
                .show_alert(true)
                .await?;
            return Ok(());
        };
        let Some(stars) = plan.stars_price else {
            self.bot
                .answer_callback_query(q.id.clone())
                .text("This bundle cannot be paid with Stars")
                .show_alert(true)
                .await?;
            return Ok(());
        };

        let user = self.require_user(&q.from).await?;
        let order = self
            .state
            .payments
            .create_stars_order(self.cfg.id, user.id, &plan)
            .await
            .map_err(|e| anyhow!("Stars order creation failed: {e}"))?;

        let prices = vec![LabeledPrice {
            label: plan.name.clone(),
            amount: stars as u32,
        }];

        let _ = self.bot.delete_message(chat_id, message_id).await;
        self.bot
            .send_invoice(
                chat_id,
                format!("{} — {} credits", plan.name, plan.credits),
                "Credits are added right after payment.".to_string(),
                order.id.to_string(),
                "XTR",
                prices,
            )
            .await?;
        Ok(())
    }

    /// Telegram requires an answer before it charges Stars; the order was
    /// validated at invoice time, so approve.
    async fn handle_pre_checkout(&self, q: PreCheckoutQuery) -> Result<()> {
        self.bot.answer_pre_checkout_query(q.id, true).await?;
        Ok(())
    }

    /// Stars money has already moved when this message arrives; run it
    /// through the same idempotent settlement as the provider webhooks.
    async fn handle_successful_payment(&self, msg: &Message, payload: &str) -> Result<()> {
        let order_id: i64 = match payload.parse() {
            Ok(id) => id,
            Err(_) => {
                warn!(
                    "Stars payment with unparsable payload '{}' for bot {}",
                    payload, self.cfg.id
                );
                return Ok(());
            }
        };

        let callback = ProviderCallback {
            internal_id: Some(order_id),
            external_id: None,
            paid: true,
            raw: json!({ "provider": provider::TELEGRAM_STARS }),
        };

        match self.state.payments.settle(callback).await? {
            SettleOutcome::Settled { .. } => {
                info!("Stars order {} settled for bot {}", order_id, self.cfg.id);
            }
            SettleOutcome::AlreadySettled | SettleOutcome::NotPaid => {}
            SettleOutcome::OrderNotFound => {
                warn!(
                    "Stars payment for unknown order {} in bot {}",
                    order_id, self.cfg.id
                );
                self.bot
                    .send_message(
                        msg.chat.id,
                        "⚠️ Payment received but the order was not found. Contact support.",
                    )
                    .await?;
            }
        }
        Ok(())
    }

    async fn require_user(&self, from: &teloxide::types::User) -> Result<artbox_db::models::User> {
        self.state
            .users
            .get_by_telegram_id(from.id.0 as i64)
            .await?
            .ok_or_else(|| anyhow!("User {} not registered", from.id))
    }
}
