//! A bank account aggregate, built on the `sourcerer` runtime to exercise
//! and demonstrate its public API end to end.
//!
//! This is demonstration code, not part of the library's public contract:
//! the facade a real application would put in front of it (an
//! environment-driven factory, a CLI, concrete database wiring) is out of
//! scope here too — see `sourcerer::config` for the environment surface a
//! real facade would read.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sourcerer::aggregate::{Aggregate, DomainEvent};
use sourcerer::topic::Topic;
use sourcerer::transcoding::DecimalStr;
use sourcerer_derive::Event;

/// Facts a bank account can record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Event)]
pub enum BankAccountEvent {
    /// The account was opened.
    #[event(topic = "bank_account::Opened")]
    Opened {
        /// The holder's full name.
        name: String,
        /// The holder's email address.
        email: String,
    },
    /// Funds were credited.
    #[event(topic = "bank_account::Credited")]
    Credited {
        /// The (positive) amount credited.
        amount: DecimalStr,
    },
    /// Funds were debited.
    #[event(topic = "bank_account::Debited")]
    Debited {
        /// The (negative) change in balance.
        amount: DecimalStr,
    },
    /// The overdraft limit was changed.
    #[event(topic = "bank_account::OverdraftLimitSet")]
    OverdraftLimitSet {
        /// The new limit, as a non-negative magnitude.
        limit: DecimalStr,
    },
}

/// A whole-state dump of a bank account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BankAccountSnapshot {
    name: String,
    email: String,
    balance: Decimal,
    overdraft_limit: Decimal,
}

impl sourcerer::aggregate::Snapshot for BankAccountSnapshot {}

/// Commands a bank account accepts.
#[derive(Debug)]
pub enum BankAccountCommand {
    /// Opens the account.
    Open {
        /// The holder's full name.
        name: String,
        /// The holder's email address.
        email: String,
    },
    /// Credits the account. `amount` must be strictly positive.
    Credit {
        /// The amount to credit.
        amount: Decimal,
    },
    /// Debits the account. `amount` must be strictly negative (the signed
    /// change it applies to the balance).
    Debit {
        /// The signed change to apply.
        amount: Decimal,
    },
    /// Sets the overdraft limit, as a non-negative magnitude.
    SetOverdraftLimit {
        /// The new limit.
        limit: Decimal,
    },
}

/// Business-rule failures a bank account command can raise.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BankAccountError {
    /// `Open` was sent to an account that was already opened.
    #[error("account already opened")]
    AlreadyOpened,
    /// Any command other than `Open` was sent before the account was opened.
    #[error("account not opened")]
    NotOpened,
    /// `Credit`/`Debit` was sent an amount with the wrong sign.
    #[error("invalid amount")]
    InvalidAmount,
    /// `SetOverdraftLimit` was sent a negative limit, or one lower than the
    /// overdraft currently in use.
    #[error("invalid overdraft limit")]
    InvalidOverdraftLimit,
    /// A debit would take the balance below `-overdraft_limit`.
    #[error("insufficient funds")]
    InsufficientFunds,
}

/// A bank account's business state: holder details, balance, and overdraft
/// limit. Identity and versioning live on the
/// [`sourcerer::aggregate::AggregateRoot`] wrapped around this type, not
/// here.
#[derive(Debug, Clone, Default)]
pub struct BankAccount {
    opened: bool,
    name: String,
    email: String,
    balance: Decimal,
    overdraft_limit: Decimal,
}

impl BankAccount {
    /// The current balance.
    #[must_use]
    pub fn balance(&self) -> Decimal {
        self.balance
    }

    /// The holder's full name, once opened.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl Aggregate for BankAccount {
    type Event = BankAccountEvent;
    type Command = BankAccountCommand;
    type Snapshot = BankAccountSnapshot;
    type Error = BankAccountError;

    fn apply_state(&mut self, event: &BankAccountEvent) {
        match event {
            BankAccountEvent::Opened { name, email } => {
                self.opened = true;
                self.name = name.clone();
                self.email = email.clone();
            }
            BankAccountEvent::Credited { amount } | BankAccountEvent::Debited { amount } => {
                self.balance += amount.0;
            }
            BankAccountEvent::OverdraftLimitSet { limit } => {
                self.overdraft_limit = limit.0;
            }
        }
    }

    async fn handle(&self, command: BankAccountCommand) -> Result<Vec<BankAccountEvent>, BankAccountError> {
        match command {
            BankAccountCommand::Open { name, email } => {
                if self.opened {
                    return Err(BankAccountError::AlreadyOpened);
                }
                Ok(vec![BankAccountEvent::Opened { name, email }])
            }
            BankAccountCommand::Credit { amount } => {
                self.require_opened()?;
                if amount <= Decimal::ZERO {
                    return Err(BankAccountError::InvalidAmount);
                }
                Ok(vec![BankAccountEvent::Credited { amount: DecimalStr(amount) }])
            }
            BankAccountCommand::Debit { amount } => {
                self.require_opened()?;
                if amount >= Decimal::ZERO {
                    return Err(BankAccountError::InvalidAmount);
                }
                if self.balance + amount < -self.overdraft_limit {
                    return Err(BankAccountError::InsufficientFunds);
                }
                Ok(vec![BankAccountEvent::Debited { amount: DecimalStr(amount) }])
            }
            BankAccountCommand::SetOverdraftLimit { limit } => {
                self.require_opened()?;
                if limit < Decimal::ZERO || limit < -self.balance {
                    return Err(BankAccountError::InvalidOverdraftLimit);
                }
                Ok(vec![BankAccountEvent::OverdraftLimitSet { limit: DecimalStr(limit) }])
            }
        }
    }

    fn to_snapshot(&self) -> BankAccountSnapshot {
        BankAccountSnapshot {
            name: self.name.clone(),
            email: self.email.clone(),
            balance: self.balance,
            overdraft_limit: self.overdraft_limit,
        }
    }

    fn from_snapshot(snapshot: BankAccountSnapshot) -> Self {
        Self {
            opened: true,
            name: snapshot.name,
            email: snapshot.email,
            balance: snapshot.balance,
            overdraft_limit: snapshot.overdraft_limit,
        }
    }
}

impl BankAccount {
    fn require_opened(&self) -> Result<(), BankAccountError> {
        if self.opened { Ok(()) } else { Err(BankAccountError::NotOpened) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_topics_are_stable() {
        assert_eq!(
            BankAccountEvent::Opened { name: "x".into(), email: "x".into() }.topic(),
            Topic("bank_account::Opened")
        );
    }
}
