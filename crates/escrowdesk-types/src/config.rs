//! Configuration for an EscrowDesk instance.
//!
//! Loaded from JSON. Every tunable has a default in [`crate::constants`], so
//! a minimal file only names the custodial wallet, the group channel and the
//! administrators.

use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ChannelId, EscrowError, Handle, Result, WalletAddress, constants};

/// Top-level escrow configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowConfig {
    /// Handles allowed to run admin commands.
    pub admins: Vec<Handle>,
    /// The only chat channel commands are accepted from; all notifications go here.
    pub group_channel: ChannelId,
    /// Address holding escrowed tokens.
    pub custodial_wallet: WalletAddress,
    /// Token contract / asset identifier passed to the ledger client.
    #[serde(default = "default_token_id")]
    pub token_id: String,
    #[serde(default = "default_min_amount")]
    pub min_amount: Decimal,
    #[serde(default = "default_max_amount")]
    pub max_amount: Decimal,
    /// Absolute slack when comparing an observed deposit to the deal amount.
    #[serde(default = "default_amount_tolerance")]
    pub amount_tolerance: Decimal,
    #[serde(default = "default_deal_ttl_secs")]
    pub deal_ttl_secs: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_claim_ttl_secs")]
    pub claim_ttl_secs: u64,
    #[serde(default)]
    pub rate_limits: RateLimitConfig,
    /// Native gas the custodial wallet must hold before any transfer.
    #[serde(default = "default_min_gas_reserve")]
    pub min_gas_reserve: Decimal,
    /// Payment-forwarding webhook capability. `None` means polling only.
    #[serde(default)]
    pub forwarding: Option<ForwardingConfig>,
}

/// Per-user sliding-window limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub command_limit: usize,
    pub command_window_secs: u64,
    pub order_limit: usize,
    pub order_window_secs: u64,
}

impl RateLimitConfig {
    #[must_use]
    pub fn command_window(&self) -> chrono::Duration {
        bounded_seconds(self.command_window_secs)
    }

    #[must_use]
    pub fn order_window(&self) -> chrono::Duration {
        bounded_seconds(self.order_window_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            command_limit: constants::DEFAULT_COMMAND_LIMIT,
            command_window_secs: constants::DEFAULT_COMMAND_WINDOW_SECS,
            order_limit: constants::DEFAULT_ORDER_LIMIT,
            order_window_secs: constants::DEFAULT_ORDER_WINDOW_SECS,
        }
    }
}

/// External payment-forwarding provider settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct ForwardingConfig {
    /// Shared HMAC secret for webhook signatures.
    pub webhook_secret: String,
}

impl std::fmt::Debug for ForwardingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardingConfig")
            .field("webhook_secret", &"<redacted>")
            .finish()
    }
}

/// `secs` as a chrono duration, clamped to [`constants::MAX_DURATION_SECS`].
fn bounded_seconds(secs: u64) -> chrono::Duration {
    i64::try_from(secs.min(constants::MAX_DURATION_SECS))
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}

fn default_token_id() -> String {
    "usdt".to_string()
}

fn default_min_amount() -> Decimal {
    Decimal::new(constants::DEFAULT_MIN_AMOUNT, 0)
}

fn default_max_amount() -> Decimal {
    Decimal::new(constants::DEFAULT_MAX_AMOUNT, 0)
}

fn default_amount_tolerance() -> Decimal {
    let (m, s) = constants::DEFAULT_AMOUNT_TOLERANCE;
    Decimal::new(m, s)
}

fn default_deal_ttl_secs() -> u64 {
    constants::DEFAULT_DEAL_TTL_SECS
}

fn default_poll_interval_secs() -> u64 {
    constants::DEFAULT_POLL_INTERVAL_SECS
}

fn default_claim_ttl_secs() -> u64 {
    constants::DEFAULT_CLAIM_TTL_SECS
}

fn default_min_gas_reserve() -> Decimal {
    let (m, s) = constants::DEFAULT_MIN_GAS_RESERVE;
    Decimal::new(m, s)
}

impl EscrowConfig {
    /// A config with every tunable at its default.
    #[must_use]
    pub fn new(custodial_wallet: WalletAddress, group_channel: ChannelId, admins: Vec<Handle>) -> Self {
        Self {
            admins,
            group_channel,
            custodial_wallet,
            token_id: default_token_id(),
            min_amount: default_min_amount(),
            max_amount: default_max_amount(),
            amount_tolerance: default_amount_tolerance(),
            deal_ttl_secs: default_deal_ttl_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            claim_ttl_secs: default_claim_ttl_secs(),
            rate_limits: RateLimitConfig::default(),
            min_gas_reserve: default_min_gas_reserve(),
            forwarding: None,
        }
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)
            .map_err(|e| EscrowError::Configuration(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            EscrowError::Configuration(format!("read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    /// Reject internally inconsistent settings.
    pub fn validate(&self) -> Result<()> {
        if self.admins.is_empty() || self.admins.iter().any(Handle::is_empty) {
            return Err(EscrowError::Configuration(
                "at least one non-empty admin handle is required".into(),
            ));
        }
        if self.min_amount <= Decimal::ZERO || self.min_amount > self.max_amount {
            return Err(EscrowError::Configuration(format!(
                "amount bounds must satisfy 0 < min <= max, got [{}, {}]",
                self.min_amount, self.max_amount
            )));
        }
        if self.amount_tolerance.is_sign_negative() {
            return Err(EscrowError::Configuration(
                "amount_tolerance must not be negative".into(),
            ));
        }
        if self.min_gas_reserve.is_sign_negative() {
            return Err(EscrowError::Configuration(
                "min_gas_reserve must not be negative".into(),
            ));
        }
        if self.deal_ttl_secs == 0 || self.poll_interval_secs == 0 || self.claim_ttl_secs == 0 {
            return Err(EscrowError::Configuration(
                "deal_ttl_secs, poll_interval_secs and claim_ttl_secs must be positive".into(),
            ));
        }
        let rl = &self.rate_limits;
        for (name, secs) in [
            ("deal_ttl_secs", self.deal_ttl_secs),
            ("poll_interval_secs", self.poll_interval_secs),
            ("claim_ttl_secs", self.claim_ttl_secs),
            ("rate_limits.command_window_secs", rl.command_window_secs),
            ("rate_limits.order_window_secs", rl.order_window_secs),
        ] {
            if secs > constants::MAX_DURATION_SECS {
                return Err(EscrowError::Configuration(format!(
                    "{name} must not exceed {} seconds, got {secs}",
                    constants::MAX_DURATION_SECS
                )));
            }
        }
        if rl.command_limit == 0
            || rl.order_limit == 0
            || rl.command_window_secs == 0
            || rl.order_window_secs == 0
        {
            return Err(EscrowError::Configuration(
                "rate limits and windows must be positive".into(),
            ));
        }
        if self
            .forwarding
            .as_ref()
            .is_some_and(|fwd| fwd.webhook_secret.is_empty())
        {
            return Err(EscrowError::Configuration(
                "forwarding.webhook_secret must not be empty".into(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn is_admin(&self, handle: &Handle) -> bool {
        self.admins.contains(handle)
    }

    /// Check `amount` against the configured transaction bounds.
    pub fn check_amount(&self, amount: Decimal) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(EscrowError::InvalidAmount {
                reason: format!("{amount} is not positive"),
            });
        }
        if amount < self.min_amount || amount > self.max_amount {
            return Err(EscrowError::AmountOutOfRange {
                amount,
                min: self.min_amount,
                max: self.max_amount,
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn deal_ttl(&self) -> chrono::Duration {
        bounded_seconds(self.deal_ttl_secs)
    }

    #[must_use]
    pub fn claim_ttl(&self) -> chrono::Duration {
        bounded_seconds(self.claim_ttl_secs)
    }

    #[must_use]
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.poll_interval_secs.min(constants::MAX_DURATION_SECS))
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl EscrowConfig {
    /// Custodial wallet `0x5a..`, group channel `-100`, admin `@admin`.
    pub fn for_tests() -> Self {
        Self::new(
            WalletAddress::parse("0x5a2dd9bfe9cb39f6a1ad806747ce29718b1bfb70")
                .expect("static address is valid"),
            ChannelId(-100),
            vec![Handle::new("@admin")],
        )
    }
}
