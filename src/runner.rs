//! Orchestration of a full collection pass and the supervising loop.

use std::time::Duration;

use crate::config::Config;
use crate::dispatch::{Dispatcher, HttpTransport};
use crate::retry::{Retrier, RetryError};
use crate::session::{Credentials, SessionController};
use crate::webdriver::WebDriverSession;

/// Runs a single collection pass, retrying the whole pass once on failure.
pub fn run_once(config: &Config) -> anyhow::Result<()> {
    let mut retrier = Retrier::new(2);
    retrier
        .run(|| collect(config), |_| true)
        .map_err(RetryError::into_inner)
}

/// Runs passes forever: up to 3 attempts per pass, then sleeps the lookback
/// interval before the next one. The only exits are process termination.
pub fn run_forever(config: &Config) -> anyhow::Result<()> {
    loop {
        let mut retrier = Retrier::new(3);
        if let Err(e) = retrier.run(|| collect(config), |_| true) {
            log::error!("collection pass failed: {e:#}");
        }
        log::info!(
            "waiting {}s before looking for new transactions",
            config.lookback_secs
        );
        std::thread::sleep(Duration::from_secs(config.lookback_secs));
    }
}

/// One full pass: authenticate, discover accounts, collect transactions,
/// dispatch, close. The session is always closed, and nothing is dispatched
/// from a pass that failed before the dispatch phase.
fn collect(config: &Config) -> anyhow::Result<()> {
    log::info!("starting collection pass");
    let page = WebDriverSession::connect(&config.webdriver_url)?;
    let credentials = Credentials {
        login: config.login.clone(),
        password: config.password.clone(),
    };
    let mut session = SessionController::new(
        page,
        credentials,
        Duration::from_secs(config.lookback_secs),
    );
    let outcome = drive(&mut session, config);
    session.close();
    outcome
}

fn drive(
    session: &mut SessionController<WebDriverSession>,
    config: &Config,
) -> anyhow::Result<()> {
    session.authenticate()?;
    session.discover_accounts()?;
    session.collect_transactions()?;

    let snapshot = session.catalog().snapshot();
    let mut dispatcher = Dispatcher::new(
        HttpTransport,
        config.send_account_url.clone(),
        config.send_payment_url.clone(),
    );
    dispatcher.send_accounts(&snapshot)?;
    dispatcher.send_payments(&snapshot)?;
    log::info!("collection pass complete");
    Ok(())
}
