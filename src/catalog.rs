//! Insertion-ordered mapping from discovered accounts to their transactions.
//! Lives for exactly one session: populated during account discovery, sealed
//! when transaction discovery starts, cleared on session close.

use crate::error::CatalogError;
use crate::models::{Account, Transaction};

#[derive(Default)]
pub struct AccountCatalog {
    entries: Vec<(Account, Vec<Transaction>)>,
    sealed: bool,
}

impl AccountCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a discovered account with an empty transaction list. Fails once
    /// the discovery phase has been sealed.
    pub fn put(&mut self, account: Account) -> Result<(), CatalogError> {
        if self.sealed {
            return Err(CatalogError::Sealed(account.name));
        }
        if self.entries.iter().any(|(a, _)| *a == account) {
            return Err(CatalogError::Duplicate(account.name));
        }
        self.entries.push((account, Vec::new()));
        Ok(())
    }

    /// Ends the discovery phase, globally. No account may be added afterwards.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Appends already-drained transactions to an existing account's list.
    pub fn append_transactions(
        &mut self,
        account: &Account,
        transactions: Vec<Transaction>,
    ) -> Result<(), CatalogError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|(a, _)| a == account)
            .ok_or_else(|| CatalogError::UnknownAccount(account.name.clone()))?;
        entry.1.extend(transactions);
        Ok(())
    }

    /// Discovered accounts in insertion order.
    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.entries.iter().map(|(a, _)| a)
    }

    /// Read-only copy handed to the dispatch layer.
    pub fn snapshot(&self) -> Vec<(Account, Vec<Transaction>)> {
        self.entries.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Empties the catalog and reopens the discovery phase. Used by session close.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.sealed = false;
    }
}
