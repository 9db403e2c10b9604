use anyhow::{anyhow, Context, Result};
use sqlx::PgPool;
use teloxide::prelude::*;
use teloxide::types::{InputFile, ParseMode};
use tracing::{info, warn};

use artbox_db::models::BroadcastStatus;
use artbox_db::repositories::{BotRepository, BroadcastRepository, UserRepository};

/// Delay between consecutive sends, to stay clear of Telegram's per-bot
/// rate limits.
const SEND_DELAY_MS: u64 = 50;
/// Persist counters every N processed recipients so an interrupted run
/// leaves usable progress behind.
const PROGRESS_EVERY: usize = 10;

/// Fans one message out to every registered user of a bot. Runs are spawned
/// detached; progress lives in the broadcasts table, not in the HTTP
/// response.
#[derive(Clone)]
pub struct BroadcastService {
    bots: BotRepository,
    users: UserRepository,
    broadcasts: BroadcastRepository,
}

impl BroadcastService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            bots: BotRepository::new(pool.clone()),
            users: UserRepository::new(pool.clone()),
            broadcasts: BroadcastRepository::new(pool),
        }
    }

    pub async fn create(&self, bot_id: i64, message: &str, image_url: Option<&str>) -> Result<i64> {
        let broadcast = self.broadcasts.create(bot_id, message, image_url).await?;
        Ok(broadcast.id)
    }

    /// Drive one broadcast from `pending` to a terminal status. Send
    /// failures are counted, not fatal; only setup errors (missing
    /// broadcast or bot) fail the run.
    pub async fn run(&self, broadcast_id: i64) {
        if let Err(e) = self.run_inner(broadcast_id).await {
            warn!("Broadcast {} failed: {e:#}", broadcast_id);
            if let Err(e) = self
                .broadcasts
                .set_status(broadcast_id, BroadcastStatus::FAILED)
                .await
            {
                warn!("Could not mark broadcast {} failed: {e:#}", broadcast_id);
            }
        }
    }

    async fn run_inner(&self, broadcast_id: i64) -> Result<()> {
        let broadcast = self
            .broadcasts
            .get_by_id(broadcast_id)
            .await?
            .ok_or_else(|| anyhow!("broadcast {} not found", broadcast_id))?;

        let bot_config = self
            .bots
            .get_by_id(broadcast.bot_id)
            .await?
            .ok_or_else(|| anyhow!("bot {} not found", broadcast.bot_id))?;

        self.broadcasts
            .set_status(broadcast_id, BroadcastStatus::PROCESSING)
            .await?;

        let recipients = self.broadcasts.recipients(broadcast.bot_id).await?;
        self.broadcasts
            .set_total_users(broadcast_id, recipients.len() as i64)
            .await?;

        info!(
            "Broadcast {} starting: {} recipients via bot {}",
            broadcast_id,
            recipients.len(),
            broadcast.bot_id
        );

        let bot = Bot::new(&bot_config.token);
        let image = match broadcast.image_url.as_deref() {
            Some(raw) => Some(url::Url::parse(raw).context("Broadcast image URL is invalid")?),
            None => None,
        };
        let mut success: i64 = 0;
        let mut fail: i64 = 0;

        for (i, recipient) in recipients.iter().enumerate() {
            let sent = match &image {
                Some(image) => bot
                    .send_photo(
                        ChatId(recipient.telegram_id),
                        InputFile::url(image.clone()),
                    )
                    .caption(&broadcast.message)
                    .parse_mode(ParseMode::Html)
                    .await
                    .map(|_| ()),
                None => bot
                    .send_message(ChatId(recipient.telegram_id), &broadcast.message)
                    .parse_mode(ParseMode::Html)
                    .await
                    .map(|_| ()),
            };
            match sent {
                Ok(_) => success += 1,
                Err(e) => {
                    fail += 1;
                    // Blocked bots and deleted accounts land here.
                    warn!(
                        "Broadcast {}: send to {} failed: {}",
                        broadcast_id, recipient.telegram_id, e
                    );
                }
            }

            if (i + 1) % PROGRESS_EVERY == 0 {
                self.broadcasts
                    .save_progress(broadcast_id, success, fail)
                    .await?;
            }

            tokio::time::sleep(tokio::time::Duration::from_millis(SEND_DELAY_MS)).await;
        }

        self.broadcasts
            .save_progress(broadcast_id, success, fail)
            .await?;
        self.broadcasts
            .set_status(broadcast_id, BroadcastStatus::COMPLETED)
            .await?;

        info!(
            "Broadcast {} complete: {} sent, {} failed",
            broadcast_id, success, fail
        );
        Ok(())
    }

    /// One-off personal message from the dashboard to a single user.
    pub async fn send_personal(&self, bot_id: i64, user_id: i64, message: &str) -> Result<()> {
        let bot_config = self
            .bots
            .get_by_id(bot_id)
            .await?
            .ok_or_else(|| anyhow!("bot {} not found", bot_id))?;
        let user = self
            .users
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| anyhow!("user {} not found", user_id))?;

        let bot = Bot::new(&bot_config.token);
        bot.send_message(ChatId(user.telegram_id), message)
            .parse_mode(ParseMode::Html)
            .await
            .context("Failed to send personal message")?;
        Ok(())
    }
}
