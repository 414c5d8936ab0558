//! # escrowdesk-store
//!
//! **Repository Layer**: durable storage for the four record families.
//!
//! | Family    | Shape                               |
//! |-----------|-------------------------------------|
//! | Deals     | map `deal id → Deal`                |
//! | Orders    | two maps, `buy` and `sell`          |
//! | Wallets   | map `handle → payout address`       |
//! | Blacklist | list of handles                     |
//!
//! Semantics are load/replace **per family**, never per record. Callers
//! serialize mutations through their own lock; a repository only promises
//! that each replace is atomic.

pub mod json_file;
pub mod memory;

use escrowdesk_types::{Blacklist, DealBook, OrderBookState, Result, WalletRegistry};

pub use json_file::JsonFileRepository;
pub use memory::MemoryRepository;

/// Per-family load/replace contract shared by every backend.
pub trait Repository: Send + Sync {
    fn load_deals(&self) -> Result<DealBook>;
    fn replace_deals(&self, deals: &DealBook) -> Result<()>;

    fn load_orders(&self) -> Result<OrderBookState>;
    fn replace_orders(&self, orders: &OrderBookState) -> Result<()>;

    fn load_wallets(&self) -> Result<WalletRegistry>;
    fn replace_wallets(&self, wallets: &WalletRegistry) -> Result<()>;

    fn load_blacklist(&self) -> Result<Blacklist>;
    fn replace_blacklist(&self, blacklist: &Blacklist) -> Result<()>;
}
