//! Data model for scraped records and the wire format the collector accepts.
//! Amounts stay strings end to end to avoid precision loss.

use serde::Serialize;
use uuid::Uuid;

/// Kind of bank product, used in the transaction filter key. Dispatch is on
/// this value, never on a separate type per kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccountKind {
    Account,
    Card,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Account => "account",
            AccountKind::Card => "card",
        }
    }
}

/// One bank product. Immutable once constructed; identity is structural.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Account {
    pub name: String,
    pub funds: String,
    pub currency: String,
    /// Opaque id from the product link's query string.
    pub account_id: String,
    pub kind: AccountKind,
}

impl Account {
    /// Value of the account option in the transaction search form.
    pub fn filter_key(&self) -> String {
        format!("{}:{}", self.kind.as_str(), self.account_id)
    }

    pub fn to_record(&self) -> AccountRecord {
        AccountRecord {
            name: self.name.clone(),
            value: self.funds.clone(),
            ccy: self.currency.clone(),
        }
    }
}

/// One ledger entry. `order_id` is the synthetic per-day ordinal assigned by
/// the extractor; it is meaningful only within the entry's day bucket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub order_id: u32,
    /// Denormalized back-reference, not an ownership relation.
    pub account_name: String,
    /// `YYYY.MM.DD`, or the raw label when it could not be canonicalized.
    pub time: String,
    pub cost: String,
    pub currency: String,
    pub description: String,
}

impl Transaction {
    /// Deterministic idempotency key: UUID v5 over the canonical string form.
    /// Structurally identical transactions collide by design.
    pub fn transaction_id(&self) -> String {
        Uuid::new_v5(&Uuid::NAMESPACE_X500, self.canonical().as_bytes())
            .simple()
            .to_string()
    }

    fn canonical(&self) -> String {
        format!(
            "Transaction(order_id='{}', account_name='{}', time='{}', cost='{}', currency='{}', description='{}')",
            self.order_id, self.account_name, self.time, self.cost, self.currency, self.description
        )
    }

    pub fn to_record(&self) -> PaymentRecord {
        PaymentRecord {
            id: self.transaction_id(),
            account: self.account_name.clone(),
            when: self.time.clone(),
            amount: self.cost.clone(),
            currency: self.currency.clone(),
            what: self.description.clone(),
        }
    }
}

/// Account record as the collector expects it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountRecord {
    pub name: String,
    pub value: String,
    pub ccy: String,
}

/// Payment record as the collector expects it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentRecord {
    pub id: String,
    pub account: String,
    pub when: String,
    pub amount: String,
    pub currency: String,
    pub what: String,
}
