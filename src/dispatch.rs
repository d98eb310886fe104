//! Outbound dispatch of the collected catalog: one JSON array of account
//! records, one of payment records, sent independently. A non-success status
//! is a warning, not a failure; retrying belongs to the transport layer here
//! only for connection-level errors.

use serde_json::Value;

use crate::error::{DispatchError, TransportError};
use crate::http;
use crate::models::{Account, AccountRecord, PaymentRecord, Transaction};
use crate::retry::{Retrier, RetryError};

const SEND_ATTEMPTS: u32 = 3;

pub struct Reply {
    pub status: u16,
    pub body: String,
}

/// Outbound transport collaborator boundary.
pub trait Transport {
    fn post_json(&mut self, url: &str, body: &Value) -> Result<Reply, TransportError>;
}

/// Transport over the shared reqwest client.
pub struct HttpTransport;

impl Transport for HttpTransport {
    fn post_json(&mut self, url: &str, body: &Value) -> Result<Reply, TransportError> {
        let reply = http::post_json(url, body).map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                TransportError::Connect(e.to_string())
            } else {
                TransportError::Other(e.to_string())
            }
        })?;
        Ok(Reply {
            status: reply.status.as_u16(),
            body: reply.body,
        })
    }
}

pub struct Dispatcher<T: Transport> {
    transport: T,
    account_url: String,
    payment_url: String,
    sleeper: fn(std::time::Duration),
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(transport: T, account_url: String, payment_url: String) -> Self {
        Self {
            transport,
            account_url,
            payment_url,
            sleeper: std::thread::sleep,
        }
    }

    #[cfg(test)]
    pub(crate) fn without_sleep(transport: T, account_url: String, payment_url: String) -> Self {
        let mut dispatcher = Self::new(transport, account_url, payment_url);
        dispatcher.sleeper = |_| {};
        dispatcher
    }

    /// Sends one account record per catalog entry.
    pub fn send_accounts(
        &mut self,
        snapshot: &[(Account, Vec<Transaction>)],
    ) -> Result<(), DispatchError> {
        let records: Vec<AccountRecord> = snapshot.iter().map(|(a, _)| a.to_record()).collect();
        let url = self.account_url.clone();
        self.post(&url, serde_json::to_value(&records)?)
    }

    /// Sends every collected transaction. An empty payload skips the call
    /// entirely.
    pub fn send_payments(
        &mut self,
        snapshot: &[(Account, Vec<Transaction>)],
    ) -> Result<(), DispatchError> {
        let records: Vec<PaymentRecord> = snapshot
            .iter()
            .flat_map(|(_, txs)| txs.iter().map(Transaction::to_record))
            .collect();
        if records.is_empty() {
            log::info!("no transactions for the requested window, skipping payment send");
            return Ok(());
        }
        let url = self.payment_url.clone();
        self.post(&url, serde_json::to_value(&records)?)
    }

    fn post(&mut self, url: &str, body: Value) -> Result<(), DispatchError> {
        let transport = &mut self.transport;
        let mut retrier = Retrier::with_sleeper(SEND_ATTEMPTS, self.sleeper);
        let reply = retrier
            .run(|| transport.post_json(url, &body), TransportError::is_connect)
            .map_err(|e| match e {
                RetryError::Exhausted { attempts, source } => {
                    DispatchError::Exhausted { attempts, source }
                }
                RetryError::Fatal(source) => DispatchError::Transport(source),
            })?;
        if !(200..300).contains(&reply.status) {
            log::warn!("request to {} answered {}", url, reply.status);
            log::error!("{}", reply.body);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AccountKind;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct Recording {
        calls: Rc<RefCell<Vec<(String, Value)>>>,
        status: u16,
        connect_failures: Rc<RefCell<u32>>,
    }

    impl Transport for Recording {
        fn post_json(&mut self, url: &str, body: &Value) -> Result<Reply, TransportError> {
            let mut failures = self.connect_failures.borrow_mut();
            if *failures > 0 {
                *failures -= 1;
                return Err(TransportError::Connect("refused".to_string()));
            }
            self.calls.borrow_mut().push((url.to_string(), body.clone()));
            Ok(Reply {
                status: self.status,
                body: String::new(),
            })
        }
    }

    fn recording(status: u16) -> Recording {
        Recording {
            status,
            ..Recording::default()
        }
    }

    fn account(name: &str) -> Account {
        Account {
            name: name.to_string(),
            funds: "10.00".to_string(),
            currency: "RUB".to_string(),
            account_id: "1".to_string(),
            kind: AccountKind::Account,
        }
    }

    fn transaction() -> Transaction {
        Transaction {
            order_id: 1,
            account_name: "acc".to_string(),
            time: "2024.01.01".to_string(),
            cost: "-5.00".to_string(),
            currency: "RUB".to_string(),
            description: "coffee".to_string(),
        }
    }

    #[test]
    fn empty_payments_skip_the_call_but_accounts_still_go_out() {
        let transport = recording(200);
        let calls = Rc::clone(&transport.calls);
        let mut dispatcher = Dispatcher::without_sleep(
            transport,
            "http://collector/api/account".to_string(),
            "http://collector/api/payment".to_string(),
        );
        let snapshot = vec![(account("a"), vec![]), (account("b"), vec![])];

        dispatcher.send_accounts(&snapshot).unwrap();
        dispatcher.send_payments(&snapshot).unwrap();

        let calls = calls.borrow();
        assert_eq!(calls.len(), 1, "payment send must be skipped");
        assert_eq!(calls[0].0, "http://collector/api/account");
        assert_eq!(calls[0].1.as_array().unwrap().len(), 2);
        assert_eq!(calls[0].1[0]["name"], "a");
        assert_eq!(calls[0].1[0]["value"], "10.00");
        assert_eq!(calls[0].1[0]["ccy"], "RUB");
    }

    #[test]
    fn payments_are_flattened_across_accounts() {
        let transport = recording(200);
        let calls = Rc::clone(&transport.calls);
        let mut dispatcher = Dispatcher::without_sleep(
            transport,
            "http://collector/api/account".to_string(),
            "http://collector/api/payment".to_string(),
        );
        let snapshot = vec![
            (account("a"), vec![transaction(), transaction()]),
            (account("b"), vec![transaction()]),
        ];

        dispatcher.send_payments(&snapshot).unwrap();

        let calls = calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "http://collector/api/payment");
        let body = calls[0].1.as_array().unwrap();
        assert_eq!(body.len(), 3);
        assert_eq!(body[0]["what"], "coffee");
        assert!(body[0]["id"].is_string());
    }

    #[test]
    fn non_success_status_is_not_an_error() {
        let transport = recording(500);
        let mut dispatcher = Dispatcher::without_sleep(
            transport,
            "http://collector/api/account".to_string(),
            "http://collector/api/payment".to_string(),
        );
        dispatcher
            .send_accounts(&[(account("a"), vec![])])
            .expect("non-2xx is only logged");
    }

    #[test]
    fn connection_failures_are_retried_until_exhaustion() {
        let transport = recording(200);
        let failures = Rc::clone(&transport.connect_failures);
        *failures.borrow_mut() = u32::MAX;
        let mut dispatcher = Dispatcher::without_sleep(
            transport,
            "http://collector/api/account".to_string(),
            "http://collector/api/payment".to_string(),
        );

        let err = dispatcher.send_accounts(&[(account("a"), vec![])]).unwrap_err();
        match err {
            DispatchError::Exhausted { attempts, source } => {
                assert_eq!(attempts, SEND_ATTEMPTS);
                assert!(source.is_connect());
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[test]
    fn transient_connection_failure_recovers() {
        let transport = recording(200);
        let calls = Rc::clone(&transport.calls);
        let failures = Rc::clone(&transport.connect_failures);
        *failures.borrow_mut() = 2;
        let mut dispatcher = Dispatcher::without_sleep(
            transport,
            "http://collector/api/account".to_string(),
            "http://collector/api/payment".to_string(),
        );

        dispatcher
            .send_accounts(&[(account("a"), vec![])])
            .expect("third attempt goes through");
        assert_eq!(calls.borrow().len(), 1);
    }
}
