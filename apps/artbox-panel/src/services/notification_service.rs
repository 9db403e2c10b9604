use anyhow::{anyhow, Context, Result};
use teloxide::prelude::*;
use teloxide::types::ParseMode;

use artbox_db::models::Order;
use artbox_db::repositories::{BotRepository, UserRepository};

/// Sends one-off service messages through the bot a user belongs to. Every
/// send is best effort; callers decide whether a failure matters.
#[derive(Clone)]
pub struct NotificationService {
    bots: BotRepository,
    users: UserRepository,
}

impl NotificationService {
    pub fn new(bots: BotRepository, users: UserRepository) -> Self {
        Self { bots, users }
    }

    /// Tell the payer their order settled and what their balance is now.
    pub async fn notify_settled(
        &self,
        order: &Order,
        credits_added: i64,
        new_balance: i64,
    ) -> Result<()> {
        let bot_config = self
            .bots
            .get_by_id(order.bot_id)
            .await?
            .ok_or_else(|| anyhow!("bot {} not found", order.bot_id))?;
        let user = self
            .users
            .get_by_id(order.user_id)
            .await?
            .ok_or_else(|| anyhow!("user {} not found", order.user_id))?;

        let bot = Bot::new(&bot_config.token);
        bot.send_message(
            ChatId(user.telegram_id),
            format_settled_message(credits_added, new_balance),
        )
        .parse_mode(ParseMode::Html)
        .await
        .context("Failed to deliver settlement notice")?;

        Ok(())
    }
}

pub(crate) fn format_settled_message(credits_added: i64, new_balance: i64) -> String {
    format!(
        "🚀 <b>Payment received!</b>\n\n\
         Credits added: <b>{credits_added}</b>\n\
         Current balance: <b>{new_balance}</b>\n\n\
         Enjoy!"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settled_message_carries_both_numbers() {
        let text = format_settled_message(50, 51);
        assert!(text.contains("<b>50</b>"));
        assert!(text.contains("<b>51</b>"));
    }
}
