//! Chat command parsing and dispatch.
//!
//! The gateway hands over `(sender, name, args, channel)`; rendering the
//! returned [`Reply`] back into chat text is the gateway's job.
//!
//! | Command             | Arguments                          | Who        |
//! |---------------------|------------------------------------|------------|
//! | `buy` / `sell`      | `AMOUNT`                           | anyone     |
//! | `setwallet`         | `ADDRESS`                          | anyone     |
//! | `sent`              | `DEAL_ID`                          | buyer      |
//! | `received`          | `DEAL_ID`                          | seller     |
//! | `notreceived`       | `DEAL_ID`                          | seller     |
//! | `dispute`           | `DEAL_ID [REASON..]`               | party      |
//! | `cancel`            |                                    | anyone     |
//! | `orders`            |                                    | anyone     |
//! | `status`            | `DEAL_ID`                          | anyone     |
//! | `deal`              | `@BUYER @SELLER AMOUNT [WALLET]`   | admin      |
//! | `release`           | `DEAL_ID`                          | admin      |
//! | `forcerelease`      | `DEAL_ID`                          | admin      |
//! | `emergencyrelease`  | `DEAL_ID`                          | admin      |
//! | `refund`            | `DEAL_ID ADDRESS`                  | admin      |
//! | `scammer`           | `@HANDLE`                          | admin      |

use std::str::FromStr;

use escrowdesk_types::{
    ChannelId, Deal, DealId, EscrowError, Handle, Order, OrderSide, Result, WalletAddress,
};
use rust_decimal::Decimal;

use crate::book::BookSnapshot;
use crate::desk::EscrowDesk;
use crate::trading::{CancelSummary, OrderOutcome};

/// A raw command as received from the chat gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundCommand {
    pub sender: Handle,
    pub name: String,
    pub args: Vec<String>,
    pub channel: ChannelId,
}

impl InboundCommand {
    pub fn new(sender: &str, name: &str, args: &[&str], channel: ChannelId) -> Self {
        Self {
            sender: Handle::new(sender),
            name: name.to_string(),
            args: args.iter().map(|a| (*a).to_string()).collect(),
            channel,
        }
    }
}

/// A validated command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Place { side: OrderSide, amount: Decimal },
    SetWallet { address: String },
    FiatSent { deal_id: DealId },
    FiatReceived { deal_id: DealId },
    NotReceived { deal_id: DealId },
    Dispute { deal_id: DealId, reason: String },
    Cancel,
    Orders,
    Status { deal_id: DealId },
    ManualDeal {
        buyer: Handle,
        seller: Handle,
        amount: Decimal,
        seller_wallet: Option<WalletAddress>,
    },
    Release { deal_id: DealId },
    ForceRelease { deal_id: DealId },
    EmergencyRelease { deal_id: DealId },
    Refund { deal_id: DealId, to: String },
    MarkScammer { handle: Handle },
}

/// Structured answer to a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    OrderPlaced(Order),
    DealOpened(Box<Deal>),
    WalletSaved {
        address: WalletAddress,
        replaced: Option<WalletAddress>,
    },
    Deal(Box<Deal>),
    Cancelled(CancelSummary),
    Orders(BookSnapshot),
    Blacklisted { handle: Handle, orders_removed: usize },
}

fn parse_amount(raw: &str) -> Result<Decimal> {
    let amount = Decimal::from_str(raw.trim()).map_err(|_| EscrowError::InvalidAmount {
        reason: format!("'{raw}' is not a number"),
    })?;
    if amount <= Decimal::ZERO {
        return Err(EscrowError::InvalidAmount {
            reason: format!("{amount} is not positive"),
        });
    }
    Ok(amount)
}

fn parse_handle(raw: &str) -> Result<Handle> {
    let handle = Handle::new(raw);
    if handle.is_empty() {
        return Err(EscrowError::WrongArgumentCount { usage: "a non-empty @handle" });
    }
    Ok(handle)
}

fn exactly<'a, const N: usize>(args: &'a [String], usage: &'static str) -> Result<[&'a str; N]> {
    if args.len() != N {
        return Err(EscrowError::WrongArgumentCount { usage });
    }
    let mut out = [""; N];
    for (slot, arg) in out.iter_mut().zip(args) {
        *slot = arg.as_str();
    }
    Ok(out)
}

fn deal_arg(args: &[String], usage: &'static str) -> Result<DealId> {
    let [id] = exactly::<1>(args, usage)?;
    id.parse()
}

impl Command {
    /// Parse a command name (with or without a leading `/`) and its arguments.
    ///
    /// # Errors
    /// `UnknownCommand`, `WrongArgumentCount`, or a format error for the
    /// offending argument.
    pub fn parse(name: &str, args: &[String]) -> Result<Self> {
        let name = name.trim().trim_start_matches('/').to_lowercase();
        match name.as_str() {
            "buy" | "sell" => {
                let [amount] = exactly::<1>(args, "/buy AMOUNT | /sell AMOUNT")?;
                let side = if name == "buy" { OrderSide::Buy } else { OrderSide::Sell };
                Ok(Self::Place {
                    side,
                    amount: parse_amount(amount)?,
                })
            }
            "setwallet" | "wallet" => {
                let [address] = exactly::<1>(args, "/setwallet 0xADDRESS")?;
                Ok(Self::SetWallet {
                    address: address.to_string(),
                })
            }
            "sent" | "paid" => Ok(Self::FiatSent {
                deal_id: deal_arg(args, "/sent DEAL_ID")?,
            }),
            "received" | "confirm" => Ok(Self::FiatReceived {
                deal_id: deal_arg(args, "/received DEAL_ID")?,
            }),
            "notreceived" => Ok(Self::NotReceived {
                deal_id: deal_arg(args, "/notreceived DEAL_ID")?,
            }),
            "dispute" => {
                let Some((id, rest)) = args.split_first() else {
                    return Err(EscrowError::WrongArgumentCount {
                        usage: "/dispute DEAL_ID [REASON]",
                    });
                };
                Ok(Self::Dispute {
                    deal_id: id.parse()?,
                    reason: rest.join(" "),
                })
            }
            "cancel" => {
                exactly::<0>(args, "/cancel")?;
                Ok(Self::Cancel)
            }
            "orders" => {
                exactly::<0>(args, "/orders")?;
                Ok(Self::Orders)
            }
            "status" => Ok(Self::Status {
                deal_id: deal_arg(args, "/status DEAL_ID")?,
            }),
            "deal" => {
                const USAGE: &str = "/deal @BUYER @SELLER AMOUNT [SELLER_WALLET]";
                let (buyer, seller, amount, wallet) = match args {
                    [b, s, a] => (b, s, a, None),
                    [b, s, a, w] => (b, s, a, Some(WalletAddress::parse(w)?)),
                    _ => return Err(EscrowError::WrongArgumentCount { usage: USAGE }),
                };
                Ok(Self::ManualDeal {
                    buyer: parse_handle(buyer)?,
                    seller: parse_handle(seller)?,
                    amount: parse_amount(amount)?,
                    seller_wallet: wallet,
                })
            }
            "release" => Ok(Self::Release {
                deal_id: deal_arg(args, "/release DEAL_ID")?,
            }),
            "forcerelease" => Ok(Self::ForceRelease {
                deal_id: deal_arg(args, "/forcerelease DEAL_ID")?,
            }),
            "emergencyrelease" => Ok(Self::EmergencyRelease {
                deal_id: deal_arg(args, "/emergencyrelease DEAL_ID")?,
            }),
            "refund" => {
                let [id, to] = exactly::<2>(args, "/refund DEAL_ID 0xADDRESS")?;
                Ok(Self::Refund {
                    deal_id: id.parse()?,
                    to: to.to_string(),
                })
            }
            "scammer" => {
                let [handle] = exactly::<1>(args, "/scammer @HANDLE")?;
                Ok(Self::MarkScammer {
                    handle: parse_handle(handle)?,
                })
            }
            _ => Err(EscrowError::UnknownCommand(name.clone())),
        }
    }

    /// Commands restricted to configured administrators.
    #[must_use]
    pub fn requires_admin(&self) -> bool {
        matches!(
            self,
            Self::ManualDeal { .. }
                | Self::Release { .. }
                | Self::ForceRelease { .. }
                | Self::EmergencyRelease { .. }
                | Self::Refund { .. }
                | Self::MarkScammer { .. }
        )
    }
}

impl EscrowDesk {
    /// Gate, parse and execute one inbound command.
    ///
    /// Order of checks: group channel, command rate limit, parse, admin.
    pub async fn dispatch(&self, inbound: &InboundCommand) -> Result<Reply> {
        if inbound.channel != self.config.group_channel {
            return Err(EscrowError::WrongChannel);
        }
        let sender = &inbound.sender;
        self.limiter().check_command(sender, self.clock.now())?;
        let command = Command::parse(&inbound.name, &inbound.args)?;
        if command.requires_admin() {
            self.ensure_admin(sender)?;
        }
        tracing::debug!(user = %sender, command = ?command, "dispatching command");

        match command {
            Command::Place { side, amount } => Ok(match self.place_order(sender, side, amount).await? {
                OrderOutcome::Rested(order) => Reply::OrderPlaced(order),
                OrderOutcome::Matched(deal) => Reply::DealOpened(deal),
            }),
            Command::SetWallet { address } => {
                let replaced = self.set_wallet(sender, &address).await?;
                Ok(Reply::WalletSaved {
                    address: WalletAddress::parse(&address)?,
                    replaced,
                })
            }
            Command::FiatSent { deal_id } => {
                Ok(Reply::Deal(Box::new(self.confirm_fiat_sent(sender, deal_id).await?)))
            }
            Command::FiatReceived { deal_id } => {
                Ok(Reply::Deal(Box::new(self.confirm_fiat_received(sender, deal_id).await?)))
            }
            Command::NotReceived { deal_id } => {
                Ok(Reply::Deal(Box::new(self.report_not_received(sender, deal_id).await?)))
            }
            Command::Dispute { deal_id, reason } => Ok(Reply::Deal(Box::new(
                self.open_dispute(sender, deal_id, &reason).await?,
            ))),
            Command::Cancel => Ok(Reply::Cancelled(self.cancel_orders(sender).await?)),
            Command::Orders => Ok(Reply::Orders(self.list_orders()?)),
            Command::Status { deal_id } => Ok(Reply::Deal(Box::new(self.deal(deal_id)?))),
            Command::ManualDeal {
                buyer,
                seller,
                amount,
                seller_wallet,
            } => Ok(Reply::DealOpened(Box::new(
                self.create_manual_deal(sender, &buyer, &seller, amount, seller_wallet)
                    .await?,
            ))),
            Command::Release { deal_id } => {
                Ok(Reply::Deal(Box::new(self.admin_release(sender, deal_id).await?)))
            }
            Command::ForceRelease { deal_id } => {
                Ok(Reply::Deal(Box::new(self.admin_force_release(sender, deal_id).await?)))
            }
            Command::EmergencyRelease { deal_id } => Ok(Reply::Deal(Box::new(
                self.admin_emergency_release(sender, deal_id).await?,
            ))),
            Command::Refund { deal_id, to } => Ok(Reply::Deal(Box::new(
                self.admin_emergency_refund(sender, deal_id, &to).await?,
            ))),
            Command::MarkScammer { handle } => {
                let removed = self.admin_mark_scammer(sender, &handle).await?;
                Ok(Reply::Blacklisted {
                    handle,
                    orders_removed: removed.len(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn parses_orders_with_and_without_slash() {
        assert_eq!(
            Command::parse("/buy", &args(&["10"])).unwrap(),
            Command::Place { side: OrderSide::Buy, amount: Decimal::TEN }
        );
        assert_eq!(
            Command::parse("SELL", &args(&["2.5"])).unwrap(),
            Command::Place { side: OrderSide::Sell, amount: Decimal::new(25, 1) }
        );
    }

    #[test]
    fn bad_amounts_rejected() {
        for raw in ["abc", "0", "-5", ""] {
            assert!(
                matches!(
                    Command::parse("buy", &args(&[raw])),
                    Err(EscrowError::InvalidAmount { .. })
                ),
                "'{raw}' should be rejected"
            );
        }
    }

    #[test]
    fn argument_count_enforced() {
        assert!(matches!(
            Command::parse("buy", &[]),
            Err(EscrowError::WrongArgumentCount { .. })
        ));
        assert!(matches!(
            Command::parse("cancel", &args(&["now"])),
            Err(EscrowError::WrongArgumentCount { .. })
        ));
        assert!(matches!(
            Command::parse("deal", &args(&["@a", "@b"])),
            Err(EscrowError::WrongArgumentCount { .. })
        ));
    }

    #[test]
    fn deal_ids_validated() {
        assert!(matches!(
            Command::parse("sent", &args(&["not-a-uuid"])),
            Err(EscrowError::InvalidDealId(_))
        ));
        let id = DealId::new();
        assert_eq!(
            Command::parse("received", &args(&[id.to_string().as_str()])).unwrap(),
            Command::FiatReceived { deal_id: id }
        );
    }

    #[test]
    fn manual_deal_with_optional_wallet() {
        let cmd = Command::parse(
            "deal",
            &args(&["@Alice", "@bob", "50", "0x3333333333333333333333333333333333333333"]),
        )
        .unwrap();
        let Command::ManualDeal { buyer, seller_wallet, .. } = &cmd else {
            panic!("expected manual deal");
        };
        assert_eq!(buyer, &Handle::new("alice"));
        assert!(seller_wallet.is_some());
        assert!(cmd.requires_admin());
    }

    #[test]
    fn dispute_reason_is_joined() {
        let id = DealId::new();
        let cmd = Command::parse("dispute", &args(&[id.to_string().as_str(), "no", "payment"])).unwrap();
        assert_eq!(cmd, Command::Dispute { deal_id: id, reason: "no payment".into() });
        assert!(!cmd.requires_admin());
    }

    #[test]
    fn unknown_command() {
        assert!(matches!(
            Command::parse("/moon", &[]),
            Err(EscrowError::UnknownCommand(name)) if name == "moon"
        ));
    }
}
