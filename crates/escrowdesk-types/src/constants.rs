//! System-wide constants for the EscrowDesk escrow engine.

/// Decimal precision of the escrowed stablecoin (USDT on Polygon).
pub const DEFAULT_TOKEN_DECIMALS: u32 = 6;

/// Minimum deal / order amount, in whole tokens.
pub const DEFAULT_MIN_AMOUNT: i64 = 1;

/// Maximum deal / order amount, in whole tokens.
pub const DEFAULT_MAX_AMOUNT: i64 = 10_000;

/// Absolute tolerance when comparing an observed deposit against the
/// expected amount, expressed as (mantissa, scale): 0.01 tokens.
pub const DEFAULT_AMOUNT_TOLERANCE: (i64, u32) = (1, 2);

/// Age after which an in-flight deal is swept, in seconds.
pub const DEFAULT_DEAL_TTL_SECS: u64 = 15 * 60;

/// Reconciliation poll interval, in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// How long a payment claim stays exclusive, in seconds.
pub const DEFAULT_CLAIM_TTL_SECS: u64 = 30;

/// Commands a single user may issue per command window.
pub const DEFAULT_COMMAND_LIMIT: usize = 10;

/// Command rate-limit window, in seconds.
pub const DEFAULT_COMMAND_WINDOW_SECS: u64 = 60;

/// Orders a single user may place per order window.
pub const DEFAULT_ORDER_LIMIT: usize = 5;

/// Order rate-limit window, in seconds.
pub const DEFAULT_ORDER_WINDOW_SECS: u64 = 3600;

/// Native gas the custodial wallet must hold before any transfer,
/// expressed as (mantissa, scale): 0.01 native units.
pub const DEFAULT_MIN_GAS_RESERVE: (i64, u32) = (1, 2);

/// Upper bound for every configured TTL, window and interval, in seconds
/// (one year).
pub const MAX_DURATION_SECS: u64 = 365 * 24 * 3600;

/// Maximum number of live payment claims kept in memory.
pub const MAX_PAYMENT_CLAIMS: usize = 10_000;

/// Placeholder stored in place of a seller wallet that was never registered.
pub const WALLET_NOT_SET: &str = "Not set";

/// Webhook event name for a deposit observed by the forwarding provider.
pub const WEBHOOK_COINS_RECEIVED: &str = "coins_received";

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "EscrowDesk";
