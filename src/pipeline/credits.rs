//! Credit accounting.
//!
//! Daily credits are never stored: they are recomputed from the number of
//! comics the owner finished today (UTC), so a comic that reached storage has
//! already paid for itself. Purchased credits live in [CreditStore] and are
//! only touched once the daily allowance is used up.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error};

use super::error::UpdateError;
use crate::constants::DAILY_ALLOWANCE_TABLE;
use crate::db::store::{ComicStore, CreditStore};
use crate::owner::OwnerId;

/// Daily credits left after `comics_today` finished comics.
pub fn daily_allowance_for(comics_today: u64) -> i64 {
    usize::try_from(comics_today)
        .ok()
        .and_then(|count| DAILY_ALLOWANCE_TABLE.get(count))
        .copied()
        .unwrap_or(0)
}

/// Snapshot of what an owner can spend right now.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CreditBalance {
    /// Free credits left today
    pub daily_allowance: i64,
    /// Credits left from top-ups
    pub purchased_balance: i64,
}

impl CreditBalance {
    /// Everything the owner can spend.
    pub fn remaining(&self) -> i64 {
        self.daily_allowance + self.purchased_balance
    }

    /// Whether a new comic may be started.
    pub fn has_credit(&self) -> bool {
        self.remaining() > 0
    }
}

/// How a finished comic was paid for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Charge {
    /// Covered by today's free allowance
    Daily,
    /// Taken from the purchased balance
    Purchased {
        /// Purchased credits left afterwards
        remaining: i64,
    },
    /// The debit could not be written; the comic was delivered anyway
    Failed,
}

/// Reads balances, applies charges and serialises runs per owner.
pub struct CreditMeter {
    comics: Arc<dyn ComicStore>,
    credits: Arc<dyn CreditStore>,
    cost: i64,
    runs: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl CreditMeter {
    /// `cost` is what one comic takes from the purchased balance.
    pub fn new(comics: Arc<dyn ComicStore>, credits: Arc<dyn CreditStore>, cost: i64) -> Self {
        Self {
            comics,
            credits,
            cost,
            runs: Mutex::new(HashMap::new()),
        }
    }

    /// Credits charged per comic
    pub fn cost(&self) -> i64 {
        self.cost
    }

    /// The owner's balance on `today`. Has no side effects.
    pub async fn balance(&self, owner: &OwnerId, today: NaiveDate) -> Result<CreditBalance, UpdateError> {
        let comics_today = self.comics.count_by_owner_and_date(owner, today).await?;
        let purchased_balance = self.credits.purchased_balance(owner).await?;
        Ok(CreditBalance {
            daily_allowance: daily_allowance_for(comics_today),
            purchased_balance,
        })
    }

    /// Total spendable credits on `today`.
    pub async fn remaining_allowance(&self, owner: &OwnerId, today: NaiveDate) -> Result<i64, UpdateError> {
        Ok(self.balance(owner, today).await?.remaining())
    }

    /// Takes `amount` from the purchased balance, saturating at zero.
    pub async fn debit(&self, owner: &OwnerId, amount: i64) -> Result<i64, UpdateError> {
        self.credits.debit_purchased(owner, amount).await
    }

    /// Adds purchased credits and returns the new balance.
    pub async fn top_up(&self, owner: &OwnerId, amount: i64) -> Result<i64, UpdateError> {
        let balance = self.credits.top_up(owner, amount).await?;
        debug!("Topped up {owner} by {amount}, purchased balance now {balance}");
        Ok(balance)
    }

    /// Pays for a comic that has just been stored.
    ///
    /// `before` is the balance read when the run started. If the daily allowance
    /// was still positive then, the stored comic already consumed it and nothing
    /// is written.
    pub async fn charge(&self, owner: &OwnerId, before: &CreditBalance) -> Charge {
        if before.daily_allowance > 0 {
            return Charge::Daily;
        }
        match self.debit(owner, self.cost).await {
            Ok(remaining) => Charge::Purchased { remaining },
            Err(err) => {
                error!("Failed to debit {} credits from {owner}: {err}", self.cost);
                Charge::Failed
            }
        }
    }

    /// Waits until no other run for `owner` is in progress.
    ///
    /// Hold the guard from the balance check until the charge is applied.
    pub async fn lock_owner(&self, owner: &OwnerId) -> OwnedMutexGuard<()> {
        let run = {
            let mut runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
            // entries nobody holds or waits on
            runs.retain(|_, run| Arc::strong_count(run) > 1);
            runs.entry(owner.as_str().to_string()).or_default().clone()
        };
        run.lock_owned().await
    }
}
