//! Forwarding-provider webhook intake.
//!
//! The provider signs the raw request body with HMAC-SHA256 under the
//! shared secret and sends the hex digest alongside. A verified
//! `coins_received` event applies the same amount rules as a balance delta,
//! keyed by the deal id in the payload. Other events are acknowledged and
//! ignored.

use escrowdesk_types::{DealId, DealStatus, EscrowError, Result, TransferReference, constants};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;

use crate::desk::EscrowDesk;
use crate::reconcile::{DepositMatch, DepositOutcome, ObservedDeposit, classify_deposit};

type HmacSha256 = Hmac<Sha256>;

/// Webhook payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    pub event: String,
    pub deal_id: Option<DealId>,
    pub amount: Option<Decimal>,
    pub transaction_id: Option<String>,
}

impl WebhookEvent {
    /// Providers may namespace event names, e.g. `address.coins_received`.
    #[must_use]
    pub fn is_coins_received(&self) -> bool {
        self.event.rsplit('.').next() == Some(constants::WEBHOOK_COINS_RECEIVED)
    }
}

/// Result of handling one webhook delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Ignored,
    Applied(DepositOutcome),
}

/// Hex HMAC-SHA256 of `body` under `secret`.
pub fn sign(secret: &[u8], body: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| EscrowError::Internal(format!("hmac key: {e}")))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a hex signature over `body`.
///
/// # Errors
/// `InvalidSignature` when the signature is not hex or does not match.
pub fn verify_signature(secret: &[u8], body: &[u8], signature_hex: &str) -> Result<()> {
    let signature = hex::decode(signature_hex.trim()).map_err(|_| EscrowError::InvalidSignature)?;
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| EscrowError::InvalidSignature)?;
    mac.update(body);
    mac.verify_slice(&signature)
        .map_err(|_| EscrowError::InvalidSignature)
}

impl EscrowDesk {
    /// Verify, parse and apply a webhook delivery.
    ///
    /// # Errors
    /// - `ForwardingDisabled` when no forwarding config is present
    /// - `InvalidSignature` on a bad signature
    /// - `MalformedWebhook` when a `coins_received` payload lacks fields
    /// - `DealNotFound`, `InvalidTransition` unless the deal awaits deposit
    ///   and is younger than the deal TTL
    /// - `PaymentAlreadyClaimed` when the payment was already processed
    pub async fn handle_webhook(&self, body: &[u8], signature_hex: &str) -> Result<WebhookOutcome> {
        let forwarding = self
            .config
            .forwarding
            .as_ref()
            .ok_or(EscrowError::ForwardingDisabled)?;
        if let Err(e) = verify_signature(forwarding.webhook_secret.as_bytes(), body, signature_hex) {
            tracing::warn!("webhook signature rejected");
            return Err(e);
        }

        let event: WebhookEvent = serde_json::from_slice(body)
            .map_err(|e| EscrowError::MalformedWebhook(e.to_string()))?;
        if !event.is_coins_received() {
            tracing::debug!(event = %event.event, "webhook event ignored");
            return Ok(WebhookOutcome::Ignored);
        }
        let (Some(deal_id), Some(amount)) = (event.deal_id, event.amount) else {
            return Err(EscrowError::MalformedWebhook(
                "coins_received requires dealId and amount".into(),
            ));
        };
        let deposit = ObservedDeposit {
            amount,
            reference: event.transaction_id.map(TransferReference),
        };

        let now = self.clock.now();
        let guard = self.state.lock().await;
        let mut deals = self.repo.load_deals()?;
        let deal = deals.get_mut(&deal_id)?;
        deal.expect_status(&[DealStatus::WaitingDeposit], "webhook deposit")?;
        if deal.is_expired(now, self.config.deal_ttl()) {
            tracing::warn!(deal_id = %deal_id, amount = %amount, "webhook deposit for expired deal");
            return Err(EscrowError::InvalidTransition {
                deal_id,
                actual: deal.status,
                action: "accept deposit after expiry",
            });
        }

        let (outcome, note) = match classify_deposit(amount, deal.amount, self.config.amount_tolerance) {
            DepositMatch::Exact => {
                self.claims.try_claim(deal_id, deal.amount, now)?;
                self.confirm_deposit(deal, &deposit)?
            }
            DepositMatch::Over | DepositMatch::Under => Self::reject_amount(deal, amount)?,
        };
        self.repo.replace_deals(&deals)?;
        drop(guard);

        tracing::info!(deal_id = %deal_id, amount = %amount, outcome = ?outcome, "webhook deposit applied");
        self.publish(vec![note]).await;
        Ok(WebhookOutcome::Applied(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"shared-secret";

    #[test]
    fn signature_round_trip() {
        let body = br#"{"event":"coins_received"}"#;
        let sig = sign(SECRET, body).unwrap();
        assert_eq!(sig.len(), 64);
        assert!(verify_signature(SECRET, body, &sig).is_ok());
    }

    #[test]
    fn tampered_body_rejected() {
        let sig = sign(SECRET, b"amount=10").unwrap();
        assert!(matches!(
            verify_signature(SECRET, b"amount=99", &sig),
            Err(EscrowError::InvalidSignature)
        ));
    }

    #[test]
    fn wrong_secret_or_garbage_rejected() {
        let body = b"payload";
        assert!(verify_signature(b"other", body, &sign(SECRET, body).unwrap()).is_err());
        assert!(verify_signature(SECRET, body, "not-hex").is_err());
        assert!(verify_signature(SECRET, body, "").is_err());
    }

    #[test]
    fn event_names_with_namespace() {
        let parse = |json: &str| serde_json::from_str::<WebhookEvent>(json).unwrap();
        assert!(parse(r#"{"event":"coins_received"}"#).is_coins_received());
        assert!(parse(r#"{"event":"address.coins_received"}"#).is_coins_received());
        assert!(!parse(r#"{"event":"address.coins_forwarded"}"#).is_coins_received());
    }

    #[test]
    fn payload_fields_are_camel_case() {
        let id = DealId::new();
        let json = format!(
            r#"{{"event":"coins_received","dealId":"{id}","amount":"10.5","transactionId":"0xabc"}}"#
        );
        let event: WebhookEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event.deal_id, Some(id));
        assert_eq!(event.amount, Some(Decimal::new(105, 1)));
        assert_eq!(event.transaction_id.as_deref(), Some("0xabc"));
    }
}
