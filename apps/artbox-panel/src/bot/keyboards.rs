use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use artbox_db::models::{BotSettings, Plan};

use crate::services::payment::provider;

pub fn main_menu(settings: &BotSettings) -> InlineKeyboardMarkup {
    let mut rows = vec![
        vec![InlineKeyboardButton::callback("🎨 Start drawing", "start_gen")],
        vec![
            InlineKeyboardButton::callback("👤 Profile", "profile"),
            InlineKeyboardButton::callback("💎 Buy credits", "buy_credits"),
        ],
    ];
    if let Some(url) = settings
        .support_url
        .as_deref()
        .and_then(|u| url::Url::parse(u).ok())
    {
        rows.push(vec![InlineKeyboardButton::url("❓ Support", url)]);
    }
    InlineKeyboardMarkup::new(rows)
}

pub fn back_to_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "🔙 Back",
        "main_menu",
    )]])
}

pub fn buy_credits_button() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "💎 Buy credits",
        "buy_credits",
    )]])
}

pub fn plans_keyboard(plans: &[Plan]) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = plans
        .iter()
        .map(|plan| {
            vec![InlineKeyboardButton::callback(
                format!(
                    "💎 {} ({} credits) — {} {}",
                    plan.name, plan.credits, plan.price, plan.currency
                ),
                format!("select_plan:{}", plan.id),
            )]
        })
        .collect();
    rows.push(vec![InlineKeyboardButton::callback("🔙 Back", "main_menu")]);
    InlineKeyboardMarkup::new(rows)
}

pub fn provider_label(provider_name: &str) -> String {
    match provider_name {
        provider::LAVA_RU => "Bank cards (Lava)".to_string(),
        provider::WATA => "Bank cards (Wata)".to_string(),
        provider::HELEKET => "Cryptocurrency (Heleket)".to_string(),
        provider::TELEGRAM_STARS => "⭐ Telegram Stars".to_string(),
        other => other.to_string(),
    }
}

/// One row per enabled external provider, plus a Stars row when the plan
/// carries a Stars price.
pub fn providers_keyboard(
    plan: &Plan,
    providers: &[String],
    stars_enabled: bool,
) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = providers
        .iter()
        .map(|name| {
            vec![InlineKeyboardButton::callback(
                provider_label(name),
                format!("pay:{}:{}", plan.id, name),
            )]
        })
        .collect();
    if stars_enabled {
        rows.push(vec![InlineKeyboardButton::callback(
            provider_label(provider::TELEGRAM_STARS),
            format!("paystars:{}", plan.id),
        )]);
    }
    rows.push(vec![InlineKeyboardButton::callback(
        "🔙 Back",
        "buy_credits",
    )]);
    InlineKeyboardMarkup::new(rows)
}

pub fn checkout_keyboard(payment_url: &str) -> InlineKeyboardMarkup {
    let mut rows = Vec::new();
    if let Ok(url) = url::Url::parse(payment_url) {
        rows.push(vec![InlineKeyboardButton::url("🔗 Go to payment", url)]);
    }
    rows.push(vec![InlineKeyboardButton::callback(
        "🔙 Cancel",
        "buy_credits",
    )]);
    InlineKeyboardMarkup::new(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn plan(id: i64, stars: Option<i64>) -> Plan {
        Plan {
            id,
            bot_id: 1,
            name: "Starter".into(),
            price: 199.0,
            currency: "RUB".into(),
            stars_price: stars,
            credits: 50,
            description: None,
            sort_order: 0,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn providers_keyboard_includes_stars_row_when_enabled() {
        let providers = vec![provider::LAVA_RU.to_string(), provider::WATA.to_string()];
        let with_stars = providers_keyboard(&plan(7, Some(100)), &providers, true);
        // two providers + stars + back
        assert_eq!(with_stars.inline_keyboard.len(), 4);

        let without = providers_keyboard(&plan(7, None), &providers, false);
        assert_eq!(without.inline_keyboard.len(), 3);
    }

    #[test]
    fn plan_rows_carry_select_callback_data() {
        let kb = plans_keyboard(&[plan(3, None)]);
        let first = &kb.inline_keyboard[0][0];
        match &first.kind {
            teloxide::types::InlineKeyboardButtonKind::CallbackData(data) => {
                assert_eq!(data, "select_plan:3");
            }
            other => panic!("unexpected button kind: {other:?}"),
        }
    }

    #[test]
    fn main_menu_gains_support_row_only_with_valid_url() {
        let mut settings = BotSettings::default();
        assert_eq!(main_menu(&settings).inline_keyboard.len(), 2);

        settings.support_url = Some("https://t.me/support".into());
        assert_eq!(main_menu(&settings).inline_keyboard.len(), 3);

        settings.support_url = Some("not a url".into());
        assert_eq!(main_menu(&settings).inline_keyboard.len(), 2);
    }
}
