use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};

use artbox_db::models::Order;

use super::{id_as_i64, id_as_string, provider, PaymentAdapter, ProviderCallback, RemoteInvoice};

const API_URL: &str = "https://api.heleket.com/v1/payment";

#[derive(Debug, Deserialize)]
pub struct HeleketCredentials {
    pub merchant_id: String,
    pub secret_key: String,
}

pub struct HeleketAdapter {
    creds: HeleketCredentials,
}

impl HeleketAdapter {
    pub fn from_credentials(credentials: &Value) -> Result<Self> {
        let creds: HeleketCredentials =
            serde_json::from_value(credentials.clone()).context("Invalid heleket credentials")?;
        Ok(Self { creds })
    }
}

/// MD5 of base64(body) concatenated with the secret, hex-encoded.
pub fn signature(body: &str, secret_key: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(body);
    format!("{:x}", md5::compute(format!("{encoded}{secret_key}")))
}

#[async_trait]
impl PaymentAdapter for HeleketAdapter {
    async fn create_invoice(
        &self,
        http: &reqwest::Client,
        order: &Order,
        app_url: &str,
    ) -> Result<RemoteInvoice> {
        let payload = json!({
            "amount": format!("{:.2}", order.amount),
            "currency": order.currency,
            "order_id": order.id.to_string(),
            "url_success": format!("{app_url}/payment/success"),
            "url_return": format!("{app_url}/payment/fail"),
            "url_callback": format!("{app_url}/webhooks/payment/heleket"),
            "lifetime": 3600,
        });

        let body = serde_json::to_string(&payload)?;
        let sign = signature(&body, &self.creds.secret_key);

        let resp: Value = http
            .post(API_URL)
            .header("merchant", &self.creds.merchant_id)
            .header("sign", sign)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await?
            .json()
            .await?;

        // state == 0 is Heleket's success marker.
        if resp.get("state").and_then(|s| s.as_i64()) != Some(0) {
            return Err(anyhow!("Heleket rejected the invoice: {resp}"));
        }

        let url = resp
            .pointer("/result/url")
            .and_then(|u| u.as_str())
            .ok_or_else(|| anyhow!("No URL in Heleket response: {resp}"))?
            .to_string();

        let external_id = resp
            .pointer("/result/uuid")
            .and_then(|u| u.as_str())
            .map(str::to_string);

        Ok(RemoteInvoice { url, external_id })
    }

    fn name(&self) -> &str {
        provider::HELEKET
    }
}

#[derive(Debug, Deserialize)]
pub struct HeleketCallback {
    pub order_id: Option<Value>,
    pub uuid: Option<Value>,
    pub status: Option<String>,
    pub payment_status: Option<String>,
}

pub fn normalize(callback: HeleketCallback, raw: Value) -> ProviderCallback {
    let paid = callback.status.as_deref() == Some("paid")
        || callback.payment_status.as_deref() == Some("success");
    ProviderCallback {
        internal_id: id_as_i64(&callback.order_id),
        external_id: id_as_string(&callback.uuid),
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
            "5bfc19b5f6f531d4f69f1a64f0a256b5"
        );
    }

    #[test]
    fn either_status_field_settles() {
        let raw = json!({ "order_id": "3", "uuid": "u-1", "status": "paid" });
        let cb: HeleketCallback = serde_json::from_value(raw.clone()).unwrap();
        assert!(normalize(cb, raw).paid);

        let raw = json!({ "order_id": "3", "payment_status": "success" });
        let cb: HeleketCallback = serde_json::from_value(raw.clone()).unwrap();
        assert!(normalize(cb, raw).paid);

        let raw = json!({ "order_id": "3", "status": "process" });
        let cb: HeleketCallback = serde_json::from_value(raw.clone()).unwrap();
        assert!(!normalize(cb, raw).paid);
    }

    #[test]
    fn uuid_becomes_external_id() {
        let raw = json!({ "order_id": "3", "uuid": "5e67f8a0", "status": "paid" });
        let cb: HeleketCallback = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(normalize(cb, raw).external_id.as_deref(), Some("5e67f8a0"));
    }
}
