//! In-memory repository. Used by tests and by deployments that accept
//! losing state on restart.

use std::sync::{Mutex, MutexGuard, PoisonError};

use escrowdesk_types::{Blacklist, DealBook, OrderBookState, Result, WalletRegistry};

use crate::Repository;

#[derive(Debug, Default)]
struct Families {
    deals: DealBook,
    orders: OrderBookState,
    wallets: WalletRegistry,
    blacklist: Blacklist,
}

/// Repository backed by process memory.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    inner: Mutex<Families>,
}

impl MemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn families(&self) -> MutexGuard<'_, Families> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Repository for MemoryRepository {
    fn load_deals(&self) -> Result<DealBook> {
        Ok(self.families().deals.clone())
    }

    fn replace_deals(&self, deals: &DealBook) -> Result<()> {
        self.families().deals = deals.clone();
        Ok(())
    }

    fn load_orders(&self) -> Result<OrderBookState> {
        Ok(self.families().orders.clone())
    }

    fn replace_orders(&self, orders: &OrderBookState) -> Result<()> {
        self.families().orders = orders.clone();
        Ok(())
    }

    fn load_wallets(&self) -> Result<WalletRegistry> {
        Ok(self.families().wallets.clone())
    }

    fn replace_wallets(&self, wallets: &WalletRegistry) -> Result<()> {
        self.families().wallets = wallets.clone();
        Ok(())
    }

    fn load_blacklist(&self) -> Result<Blacklist> {
        Ok(self.families().blacklist.clone())
    }

    fn replace_blacklist(&self, blacklist: &Blacklist) -> Result<()> {
        self.families().blacklist = blacklist.clone();
        Ok(())
    }
}
