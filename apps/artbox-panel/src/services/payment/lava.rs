use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;

use artbox_db::models::Order;

use super::{id_as_i64, id_as_string, provider, PaymentAdapter, ProviderCallback, RemoteInvoice};

const API_URL: &str = "https://api.lava.ru/business/invoice/create";

/// Webhook source addresses published by Lava; anything else is rejected
/// with 403 before the body is looked at.
pub const ALLOWED_IPS: [&str; 3] = ["62.122.173.38", "91.227.144.73", "31.133.222.20"];

#[derive(Debug, Deserialize)]
pub struct LavaCredentials {
    pub shop_id: String,
    pub secret_key: String,
}

pub struct LavaAdapter {
    creds: LavaCredentials,
}

impl LavaAdapter {
    pub fn from_credentials(credentials: &Value) -> Result<Self> {
        let creds: LavaCredentials = serde_json::from_value(credentials.clone())
            .context("Invalid lava_ru credentials")?;
        Ok(Self { creds })
    }
}

/// HMAC-SHA256 of the exact request body, hex-encoded. Lava verifies the
/// signature against the bytes on the wire, so the body must be serialized
/// once and signed as-is.
pub fn signature(body: &str, secret_key: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret_key.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[async_trait]
impl PaymentAdapter for LavaAdapter {
    async fn create_invoice(
        &self,
        http: &reqwest::Client,
        order: &Order,
        app_url: &str,
    ) -> Result<RemoteInvoice> {
        let payload = json!({
            "shopId": self.creds.shop_id,
            "sum": order.amount,
            "orderId": order.id.to_string(),
            "hookUrl": format!("{app_url}/webhooks/payment/lava_ru"),
            "customFields": json!({ "bot_id": order.bot_id, "tg_user_id": order.user_id }).to_string(),
            "comment": format!("Credits order #{}", order.id),
        });

        let body = serde_json::to_string(&payload)?;
        let sign = signature(&body, &self.creds.secret_key);

        let resp: Value = http
            .post(API_URL)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .header("Signature", sign)
            .body(body)
            .send()
            .await?
            .json()
            .await?;

        // Lava answers both flat and nested, depending on API generation.
        let url = resp
            .get("url")
            .or_else(|| resp.pointer("/data/url"))
            .and_then(|u| u.as_str())
            .ok_or_else(|| anyhow!("No URL in Lava response: {resp}"))?
            .to_string();

        let external_id = resp
            .get("id")
            .or_else(|| resp.pointer("/data/id"))
            .and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });

        Ok(RemoteInvoice { url, external_id })
    }

    fn name(&self) -> &str {
        provider::LAVA_RU
    }
}

/// Lava sends snake_case or camelCase depending on API generation.
#[derive(Debug, Deserialize)]
pub struct LavaCallback {
    #[serde(alias = "orderId")]
    pub order_id: Option<Value>,
    #[serde(alias = "invoiceId")]
    pub invoice_id: Option<Value>,
    pub status: Option<String>,
}

pub fn normalize(callback: LavaCallback, raw: Value) -> ProviderCallback {
    let paid = matches!(
        callback.status.as_deref(),
        Some("success") | Some("completed")
    );
    ProviderCallback {
        internal_id: id_as_i64(&callback.order_id),
        external_id: id_as_string(&callback.invoice_id),
        paid,
        raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn signature_matches_known_vector() {
        let body = r#"{"amount":"10.00","currency":"USD","order_id":"42"}"#;
        assert_eq!(
            signature(body, "topsecret"),
            "9f3d9bf3d9b0fe5823ad386ec1907276b56e1c7ce077d8faf7dac812bc6fc297"
        );
    }

    #[test]
    fn accepts_both_field_spellings() {
        let raw = json!({ "orderId": "17", "invoiceId": "inv-1", "status": "success" });
        let cb: LavaCallback = serde_json::from_value(raw.clone()).unwrap();
        let normalized = normalize(cb, raw);
        assert_eq!(normalized.internal_id, Some(17));
        assert_eq!(normalized.external_id.as_deref(), Some("inv-1"));
        assert!(normalized.paid);

        let raw = json!({ "order_id": 17, "invoice_id": "inv-1", "status": "completed" });
        let cb: LavaCallback = serde_json::from_value(raw.clone()).unwrap();
        assert!(normalize(cb, raw).paid);
    }

    #[test]
    fn non_terminal_status_is_not_paid() {
        for status in ["pending", "error", "cancel", ""] {
            let raw = json!({ "order_id": "5", "status": status });
            let cb: LavaCallback = serde_json::from_value(raw.clone()).unwrap();
            assert!(!normalize(cb, raw).paid, "status {status:?} must not settle");
        }
    }
}
