//! Wallet addresses and the handle → payout address registry.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{EscrowError, Handle, Result, constants};

/// An EVM-style account address: `0x` followed by 40 hex digits.
///
/// Stored lowercase so two spellings of the same address compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WalletAddress(String);

impl WalletAddress {
    /// Validate and normalise an address.
    ///
    /// # Errors
    /// Returns `InvalidAddress` if the string is not `0x` + 40 hex digits.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let body = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| EscrowError::InvalidAddress(raw.to_string()))?;
        if body.len() != 40 || hex::decode(body).is_err() {
            return Err(EscrowError::InvalidAddress(raw.to_string()));
        }
        Ok(Self(format!("0x{}", body.to_lowercase())))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for WalletAddress {
    type Err = EscrowError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for WalletAddress {
    type Error = EscrowError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<WalletAddress> for String {
    fn from(value: WalletAddress) -> Self {
        value.0
    }
}

/// The seller's authorized deposit wallet on a deal. "Unset" is a valid value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "address")]
pub enum SellerWallet {
    #[default]
    Unset,
    Set(WalletAddress),
}

impl SellerWallet {
    #[must_use]
    pub fn is_set(&self) -> bool {
        matches!(self, Self::Set(_))
    }

    #[must_use]
    pub fn address(&self) -> Option<&WalletAddress> {
        match self {
            Self::Set(addr) => Some(addr),
            Self::Unset => None,
        }
    }
}

impl From<Option<WalletAddress>> for SellerWallet {
    fn from(value: Option<WalletAddress>) -> Self {
        value.map_or(Self::Unset, Self::Set)
    }
}

impl fmt::Display for SellerWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set(addr) => write!(f, "{addr}"),
            Self::Unset => f.write_str(constants::WALLET_NOT_SET),
        }
    }
}

/// One payout address per handle. Re-registration overwrites.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletRegistry {
    entries: BTreeMap<Handle, WalletAddress>,
}

impl WalletRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the payout address for `handle`.
    /// Returns the previous address, if any.
    pub fn register(&mut self, handle: Handle, address: WalletAddress) -> Option<WalletAddress> {
        self.entries.insert(handle, address)
    }

    #[must_use]
    pub fn get(&self, handle: &Handle) -> Option<&WalletAddress> {
        self.entries.get(handle)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
