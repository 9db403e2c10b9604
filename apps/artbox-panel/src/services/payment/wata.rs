use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use artbox_db::models::Order;

use super::{id_as_i64, id_as_string, provider, PaymentAdapter, ProviderCallback, RemoteInvoice};

const API_URL: &str = "https://api.wata.pro/api/h2h/links";

#[derive(Debug, Deserialize)]
pub struct WataCredentials {
    pub api_key: String,
}

pub struct WataAdapter {
    creds: WataCredentials,
}

impl WataAdapter {
    pub fn from_credentials(credentials: &Value) -> Result<Self> {
        let creds: WataCredentials =
            serde_json::from_value(credentials.clone()).context("Invalid wata credentials")?;
        Ok(Self { creds })
    }
}

#[async_trait]
impl PaymentAdapter for WataAdapter {
    async fn create_invoice(
        &self,
        http: &reqwest::Client,
        order: &Order,
        app_url: &str,
    ) -> Result<RemoteInvoice> {
        let payload = json!({
            "amount": order.amount,
            "currency": order.currency,
            "description": format!("Credits order #{}", order.id),
            "orderId": order.id.to_string(),
            "successRedirectUrl": format!("{app_url}/payment/success"),
            "failRedirectUrl": format!("{app_url}/payment/fail"),
            "expirationDateTime": (Utc::now() + Duration::hours(1)).to_rfc3339(),
        });

        let resp: Value = http
            .post(API_URL)
            .bearer_auth(&self.creds.api_key)
            .header("Accept", "application/json")
            .json(&payload)
            .send()
            .await?
            .json()
            .await?;

        let url = resp
            .get("url")
            .and_then(|u| u.as_str())
            .ok_or_else(|| anyhow!("No URL in Wata response: {resp}"))?
            .to_string();

        let external_id = resp.get("id").and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

        Ok(RemoteInvoice { url, external_id })
    }

    fn name(&self) -> &str {
        provider::WATA
    }
}

#[derive(Debug, Deserialize)]
pub struct WataCallback {
    #[serde(rename = "orderId")]
    pub order_id: Option<Value>,
    #[serde(rename = "transactionId")]
    pub transaction_id: Option<Value>,
    #[serde(rename = "transactionStatus")]
    pub transaction_status: Option<String>,
}

pub fn normalize(callback: WataCallback, raw: Value) -> ProviderCallback {
    let paid = callback.transaction_status.as_deref() == Some("Paid");
    ProviderCallback {
        internal_id: id_as_i64(&callback.order_id),
        external_id: id_as_string(&callback.transaction_id),
        paid,
        raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn paid_status_is_exact() {
        let raw = json!({
            "orderId": "8",
            "transactionId": "tx-99",
            "transactionStatus": "Paid"
        });
        let cb: WataCallback = serde_json::from_value(raw.clone()).unwrap();
        let normalized = normalize(cb, raw);
        assert!(normalized.paid);
        assert_eq!(normalized.internal_id, Some(8));
        assert_eq!(normalized.external_id.as_deref(), Some("tx-99"));

        // Case matters; "paid" and "Declined" must not settle.
        for status in ["paid", "Declined", "Pending"] {
            let raw = json!({ "orderId": "8", "transactionStatus": status });
            let cb: WataCallback = serde_json::from_value(raw.clone()).unwrap();
            assert!(!normalize(cb, raw).paid);
        }
    }

    #[test]
    fn numeric_order_id_is_accepted() {
        let raw = json!({ "orderId": 31, "transactionStatus": "Paid" });
        let cb: WataCallback = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(normalize(cb, raw).internal_id, Some(31));
    }
}
