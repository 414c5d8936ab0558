//! Flat-file JSON repository: one document per record family.
//!
//! ```text
//! <dir>/deals.json      { "<deal id>": Deal, ... }
//! <dir>/orders.json     { "buy": {..}, "sell": {..} }
//! <dir>/wallets.json    { "<handle>": "0x..", ... }
//! <dir>/blacklist.json  [ "<handle>", ... ]
//! ```
//!
//! A missing file loads as the empty family. Replace writes a sibling temp
//! file and renames it over the target, so readers never see a torn document.

use std::{
    fs,
    path::{Path, PathBuf},
};

use escrowdesk_types::{
    Blacklist, DealBook, EscrowError, OrderBookState, Result, WalletRegistry,
};
use serde::{Serialize, de::DeserializeOwned};

use crate::Repository;

const DEALS_FILE: &str = "deals.json";
const ORDERS_FILE: &str = "orders.json";
const WALLETS_FILE: &str = "wallets.json";
const BLACKLIST_FILE: &str = "blacklist.json";

/// Repository storing each family as a pretty-printed JSON file.
#[derive(Debug)]
pub struct JsonFileRepository {
    dir: PathBuf,
}

impl JsonFileRepository {
    /// Open (and create if needed) the data directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            EscrowError::Io(format!("create data dir {}: {e}", dir.display()))
        })?;
        tracing::info!(dir = %dir.display(), "opened JSON repository");
        Ok(Self { dir })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T> {
        let path = self.dir.join(name);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
            Err(e) => return Err(EscrowError::Io(format!("read {}: {e}", path.display()))),
        };
        serde_json::from_str(&raw)
            .map_err(|e| EscrowError::Serialization(format!("parse {}: {e}", path.display())))
    }

    fn write<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.dir.join(name);
        let tmp = self.dir.join(format!(".{name}.tmp"));
        let json = serde_json::to_vec_pretty(value)?;
        fs::write(&tmp, json)
            .map_err(|e| EscrowError::Io(format!("write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, &path)
            .map_err(|e| EscrowError::Io(format!("rename to {}: {e}", path.display())))?;
        tracing::debug!(file = name, "family replaced");
        Ok(())
    }
}

impl Repository for JsonFileRepository {
    fn load_deals(&self) -> Result<DealBook> {
        self.read(DEALS_FILE)
    }

    fn replace_deals(&self, deals: &DealBook) -> Result<()> {
        self.write(DEALS_FILE, deals)
    }

    fn load_orders(&self) -> Result<OrderBookState> {
        self.read(ORDERS_FILE)
    }

    fn replace_orders(&self, orders: &OrderBookState) -> Result<()> {
        self.write(ORDERS_FILE, orders)
    }

    fn load_wallets(&self) -> Result<WalletRegistry> {
        self.read(WALLETS_FILE)
    }

    fn replace_wallets(&self, wallets: &WalletRegistry) -> Result<()> {
        self.write(WALLETS_FILE, wallets)
    }

    fn load_blacklist(&self) -> Result<Blacklist> {
        self.read(BLACKLIST_FILE)
    }

    fn replace_blacklist(&self, blacklist: &Blacklist) -> Result<()> {
        self.write(BLACKLIST_FILE, blacklist)
    }
}
