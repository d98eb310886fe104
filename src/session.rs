//! Authenticated-session lifecycle against the bank's web UI: authenticate,
//! navigate, discover accounts, collect transactions, tear down. Owns the
//! single rendered-page resource and the catalog for exactly one session.

use std::time::{Duration, Instant};

use chrono::Local;

use crate::catalog::AccountCatalog;
use crate::error::{PageError, SessionError};
use crate::extract::TransactionPages;
use crate::models::{Account, AccountKind};
use crate::page::{Locator, Page, WaitCondition};
use crate::parse;
use crate::retry::{Retrier, RetryError};

pub const ENTRY_URL: &str = "https://online.sberbank.ru/";

const NAV_ATTEMPTS: u32 = 5;
const REDIRECT_ATTEMPTS: u32 = 5;
const LOGIN_FORM_ATTEMPTS: u32 = 3;

/// Link texts and locators of the fixed page layout contract.
const DEPOSITS_LINK: &str = "Все вклады и счета";
const CARDS_LINK: &str = "Все карты";
const HISTORY_LINK_XPATH: &str = "//ul[contains(@class, 'linksList')]/li/a/\
     div[contains(@class, 'greenTitle')]/span[contains(text(), 'История операций')]";
const FILTER_SUBMIT_XPATH: &str =
    ".//div[contains(@class, 'commandButton')]//span[contains(text(), 'Применить')]";

#[derive(Clone)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

pub struct SessionController<P: Page> {
    page: Option<P>,
    credentials: Credentials,
    /// Window bounding which transactions are requested per run.
    lookback: Duration,
    /// Landing URL captured after authentication; the anchor for all later
    /// navigation and the authenticated-state marker.
    home_url: Option<String>,
    catalog: AccountCatalog,
    sleeper: fn(Duration),
}

impl<P: Page> SessionController<P> {
    pub fn new(page: P, credentials: Credentials, lookback: Duration) -> Self {
        Self {
            page: Some(page),
            credentials,
            lookback,
            home_url: None,
            catalog: AccountCatalog::new(),
            sleeper: std::thread::sleep,
        }
    }

    #[cfg(test)]
    pub(crate) fn without_sleep(page: P, credentials: Credentials, lookback: Duration) -> Self {
        let mut session = Self::new(page, credentials, lookback);
        session.sleeper = |_| {};
        session
    }

    pub fn catalog(&self) -> &AccountCatalog {
        &self.catalog
    }

    /// Releases the page resource, clears the catalog and invalidates the
    /// home reference. Idempotent; every later operation fails fast.
    pub fn close(&mut self) {
        if let Some(mut page) = self.page.take() {
            log::info!("closing the web driver");
            page.quit();
        }
        self.catalog.clear();
        self.home_url = None;
    }

    /// Logs in and captures the landing URL as the home reference. Any retry
    /// exhaustion closes the session and surfaces the terminal error.
    pub fn authenticate(&mut self) -> Result<(), SessionError> {
        self.navigate(ENTRY_URL)?;

        let login_form = Locator::id("loginByLogin");
        let wait = WaitCondition::ElementPresent(login_form.clone());
        self.retried(LOGIN_FORM_ATTEMPTS, |page| page.wait_until(&wait))?;

        let credentials = self.credentials.clone();
        let page = self.page_mut()?;
        let login_input = page.find(&login_form)?;
        page.send_keys(&login_input, &credentials.login)?;
        let password_input = page.find(&Locator::id("password"))?;
        page.send_keys(&password_input, &credentials.password)?;

        let form = page.find(&Locator::id("homeAuth"))?;
        let button = page.find_in(&form, &Locator::xpath("button[@type='button']"))?;
        self.wait_click_redirect(&button)?;

        self.home_url = Some(self.page_mut()?.current_url()?);
        Ok(())
    }

    /// Retrier-wrapped page load; exhaustion closes the session.
    pub fn navigate(&mut self, url: &str) -> Result<(), SessionError> {
        let started = Instant::now();
        self.retried(NAV_ATTEMPTS, |page| page.open(url))?;
        log::info!("loaded {} in {:.2}s", url, started.elapsed().as_secs_f64());
        Ok(())
    }

    /// Clicks an element and waits for the URL to change away from the one
    /// captured before the click; exhaustion closes the session.
    pub fn wait_click_redirect(&mut self, element: &P::Element) -> Result<(), SessionError> {
        let from = self.page_mut()?.current_url()?;
        let wait = WaitCondition::UrlChanged(from.clone());
        let started = Instant::now();
        self.retried(REDIRECT_ATTEMPTS, |page| {
            page.click(element)?;
            page.wait_until(&wait)
        })?;
        let to = self.page_mut()?.current_url()?;
        log::info!(
            "redirected from {} to {} in {:.2}s",
            from,
            to,
            started.elapsed().as_secs_f64()
        );
        Ok(())
    }

    /// Walks both account views and records one catalog entry per product.
    pub fn discover_accounts(&mut self) -> Result<(), SessionError> {
        self.discover_view(DEPOSITS_LINK, AccountKind::Account)?;
        self.discover_view(CARDS_LINK, AccountKind::Card)
    }

    fn discover_view(&mut self, link_text: &str, kind: AccountKind) -> Result<(), SessionError> {
        let home = self.home()?;
        self.navigate(&home)?;

        let page = self.page_mut()?;
        let link = page.find(&Locator::link_text(link_text))?;
        self.wait_click_redirect(&link)?;

        let page = self.page.as_mut().ok_or(SessionError::NotAuthenticated)?;
        let covers = page.find_all(&Locator::xpath("//div[contains(@class, 'productCover')]"))?;
        for cover in covers {
            let account = parse_account(page, &cover, kind)?;
            log::debug!("discovered {} account {}", kind.as_str(), account.name);
            self.catalog.put(account)?;
        }
        Ok(())
    }

    /// Ends account discovery and fills every catalog entry by draining the
    /// paginated extractor, one account at a time (the page is a single
    /// shared view and cannot be walked concurrently).
    pub fn collect_transactions(&mut self) -> Result<(), SessionError> {
        let home = self.home()?;
        self.navigate(&home)?;

        let page = self.page_mut()?;
        let link = page.find(&Locator::xpath(HISTORY_LINK_XPATH))?;
        self.wait_click_redirect(&link)?;

        self.catalog.seal();
        let accounts: Vec<Account> = self.catalog.accounts().cloned().collect();
        for account in accounts {
            self.apply_filter(&account)?;
            let today = Local::now().date_naive();
            let sleeper = self.sleeper;
            let page = self.page_mut()?;
            let mut collected = Vec::new();
            for item in TransactionPages::with_sleeper(page, &account, today, sleeper)? {
                collected.push(item?);
            }
            log::info!(
                "collected {} transactions for account {}",
                collected.len(),
                account.name
            );
            self.catalog.append_transactions(&account, collected)?;
        }
        Ok(())
    }

    /// Fills the transaction search form: account filter key, date window,
    /// minimum amount, submit.
    fn apply_filter(&mut self, account: &Account) -> Result<(), SessionError> {
        let lookback = self.lookback;
        let page = self.page_mut()?;

        // The extended filter popup may be collapsed.
        let filter_form = page.find(&Locator::class("filterMore"))?;
        if !page.is_displayed(&filter_form)? {
            let toggle = page.find(&Locator::class("extendFilterButton"))?;
            page.click(&toggle)?;
        }
        let filter_form = page.find(&Locator::class("filterMore"))?;

        let selector = page.find_in(&filter_form, &Locator::id("customSelect1"))?;
        page.click(&selector)?;
        let option = page.find(&Locator::xpath(&format!(
            "//div[@id='customSelect1_List']//li[@value='{}']",
            account.filter_key()
        )))?;
        page.click(&option)?;

        let to_date = Local::now().date_naive();
        let from_date = to_date
            - chrono::Duration::from_std(lookback).unwrap_or_else(|_| chrono::Duration::days(1));
        let page = self.page_mut()?;
        let from_field = page.find_in(&filter_form, &Locator::id("filter(fromDate)"))?;
        page.clear(&from_field)?;
        page.send_keys(&from_field, &parse::filter_date(from_date))?;
        let to_field = page.find_in(&filter_form, &Locator::id("filter(toDate)"))?;
        page.clear(&to_field)?;
        page.send_keys(&to_field, &parse::filter_date(to_date))?;

        // Exclude zero-amount entries such as free reports.
        let min_money = page.find_in(
            &filter_form,
            &Locator::xpath(".//div[@class=\"amountTitle\"]/input[@class=\"moneyField\"]"),
        )?;
        page.send_keys(&min_money, "0.01")?;

        let submit = page.find_in(&filter_form, &Locator::xpath(FILTER_SUBMIT_XPATH))?;
        page.click(&submit)?;
        Ok(())
    }

    /// The authenticated-state gate: fails fast without retry when the
    /// session was never authenticated or has been closed.
    fn home(&self) -> Result<String, SessionError> {
        self.home_url.clone().ok_or(SessionError::NotAuthenticated)
    }

    fn page_mut(&mut self) -> Result<&mut P, SessionError> {
        self.page.as_mut().ok_or(SessionError::NotAuthenticated)
    }

    /// Runs a page operation through a fresh retrier; on exhaustion the
    /// session is force-closed before the terminal error is re-raised.
    fn retried(
        &mut self,
        attempts: u32,
        mut op: impl FnMut(&mut P) -> Result<(), PageError>,
    ) -> Result<(), SessionError> {
        let mut retrier = Retrier::with_sleeper(attempts, self.sleeper);
        let page = self.page.as_mut().ok_or(SessionError::NotAuthenticated)?;
        match retrier.run(|| op(&mut *page), PageError::is_timeout) {
            Ok(()) => Ok(()),
            Err(RetryError::Exhausted { attempts, source }) => {
                self.close();
                Err(SessionError::Exhausted { attempts, source })
            }
            Err(RetryError::Fatal(e)) => Err(e.into()),
        }
    }
}

/// Builds an [`Account`] from one product cover element. Required fields are
/// validated here: a cover without an id-bearing product link is an error.
fn parse_account<P: Page>(
    page: &mut P,
    cover: &P::Element,
    kind: AccountKind,
) -> Result<Account, SessionError> {
    let title = page.find_in(cover, &Locator::xpath(".//span[contains(@class, 'titleBlock')]"))?;
    let name = page
        .attr(&title, "title")?
        .ok_or_else(|| SessionError::Malformed("product cover without a title".into()))?;

    let link = page.find_in(cover, &Locator::xpath(".//div[contains(@class, 'pruductImg')]/a"))?;
    let href = page
        .attr(&link, "href")?
        .ok_or_else(|| SessionError::Malformed("product link without href".into()))?;
    let account_id = parse::query_attr(&href, "id")
        .ok_or_else(|| SessionError::Malformed(format!("no id parameter in {href}")))?;

    let funds_el = page.find_in(
        cover,
        &Locator::xpath(".//span[contains(@class, 'overallAmount')]"),
    )?;
    let raw_funds = page.text(&funds_el)?;
    let (amount, currency) = raw_funds
        .rsplit_once(' ')
        .ok_or_else(|| SessionError::Malformed(format!("funds cell {raw_funds:?}")))?;

    Ok(Account {
        name,
        funds: parse::normalize_amount(amount),
        currency: parse::normalize_currency(currency),
        account_id,
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CatalogError;
    use crate::page::fake::{FakePage, FakeState};

    fn credentials() -> Credentials {
        Credentials {
            login: "user".to_string(),
            password: "secret".to_string(),
        }
    }

    fn lookback() -> Duration {
        Duration::from_secs(24 * 60 * 60)
    }

    /// Registers a working login page whose submit click lands on the menu.
    fn install_login_flow(page: &mut FakePage) {
        let state = &mut page.state;
        state.register("", &Locator::id("loginByLogin"), &["login-input"]);
        state.register("", &Locator::id("password"), &["password-input"]);
        state.register("", &Locator::id("homeAuth"), &["auth-form"]);
        state.register(
            "auth-form",
            &Locator::xpath("button[@type='button']"),
            &["submit"],
        );
        page.on_click("submit", |state| {
            state.url = "https://bank.example/main-menu".to_string();
        });
    }

    /// Registers one product cover under the given keys.
    fn install_cover(state: &mut FakeState, key: &str, name: &str, id: &str, funds: &str) {
        let title = format!("{key}-title");
        let link = format!("{key}-link");
        let amount = format!("{key}-amount");
        state.register(
            key,
            &Locator::xpath(".//span[contains(@class, 'titleBlock')]"),
            &[&title],
        );
        state.set_attr(&title, "title", name);
        state.register(
            key,
            &Locator::xpath(".//div[contains(@class, 'pruductImg')]/a"),
            &[&link],
        );
        state.set_attr(&link, "href", &format!("https://bank.example/product?id={id}"));
        state.register(
            key,
            &Locator::xpath(".//span[contains(@class, 'overallAmount')]"),
            &[&amount],
        );
        state.set_text(&amount, funds);
    }

    #[test]
    fn authenticate_captures_home_reference() {
        let mut page = FakePage::new("about:blank");
        install_login_flow(&mut page);
        let mut session = SessionController::without_sleep(page, credentials(), lookback());

        session.authenticate().expect("authentication");

        assert_eq!(
            session.home().unwrap(),
            "https://bank.example/main-menu"
        );
    }

    #[test]
    fn authenticate_exhaustion_closes_session_and_surfaces_terminal_error() {
        let mut page = FakePage::new("about:blank");
        // Login form never shows up: every wait times out.
        let wait = WaitCondition::ElementPresent(Locator::id("loginByLogin"));
        page.wait_timeouts.insert(wait.to_string(), u32::MAX);
        let mut session = SessionController::without_sleep(page, credentials(), lookback());

        let err = session.authenticate().unwrap_err();

        match err {
            SessionError::Exhausted { attempts, source } => {
                assert_eq!(attempts, LOGIN_FORM_ATTEMPTS);
                assert!(source.is_timeout());
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
        assert!(session.catalog().is_empty());
        assert!(matches!(
            session.home().unwrap_err(),
            SessionError::NotAuthenticated
        ));
        // Operations on the closed session fail fast, without retries.
        assert!(matches!(
            session.discover_accounts().unwrap_err(),
            SessionError::NotAuthenticated
        ));
    }

    #[test]
    fn navigation_timeout_exhaustion_closes_session() {
        let mut page = FakePage::new("about:blank");
        page.open_timeouts = u32::MAX;
        let mut session = SessionController::without_sleep(page, credentials(), lookback());

        let err = session.authenticate().unwrap_err();
        assert!(matches!(
            err,
            SessionError::Exhausted {
                attempts: NAV_ATTEMPTS,
                ..
            }
        ));
        assert!(matches!(
            session.home().unwrap_err(),
            SessionError::NotAuthenticated
        ));
    }

    #[test]
    fn discovery_requires_authentication() {
        let page = FakePage::new("about:blank");
        let mut session = SessionController::without_sleep(page, credentials(), lookback());
        assert!(matches!(
            session.discover_accounts().unwrap_err(),
            SessionError::NotAuthenticated
        ));
        assert!(matches!(
            session.collect_transactions().unwrap_err(),
            SessionError::NotAuthenticated
        ));
    }

    #[test]
    fn discover_accounts_records_both_views_in_order() {
        let mut page = FakePage::new("about:blank");
        install_login_flow(&mut page);

        // Deposits view link: its click must change the URL.
        page.state
            .register("", &Locator::link_text(DEPOSITS_LINK), &["deposits-link"]);
        page.on_click("deposits-link", |state| {
            state.url = "https://bank.example/deposits".to_string();
            state.register(
                "",
                &Locator::xpath("//div[contains(@class, 'productCover')]"),
                &["cover-dep"],
            );
            install_cover(state, "cover-dep", "Накопительный", "11", "5 000,00 руб.");
        });
        page.state
            .register("", &Locator::link_text(CARDS_LINK), &["cards-link"]);
        page.on_click("cards-link", |state| {
            state.url = "https://bank.example/cards".to_string();
            state.register(
                "",
                &Locator::xpath("//div[contains(@class, 'productCover')]"),
                &["cover-card"],
            );
            install_cover(state, "cover-card", "Visa Classic", "22", "100,00 ЕВРО");
        });

        let mut session = SessionController::without_sleep(page, credentials(), lookback());
        session.authenticate().expect("authentication");
        session.discover_accounts().expect("discovery");

        let accounts: Vec<Account> = session.catalog().accounts().cloned().collect();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].name, "Накопительный");
        assert_eq!(accounts[0].kind, AccountKind::Account);
        assert_eq!(accounts[0].funds, "5000.00");
        assert_eq!(accounts[0].filter_key(), "account:11");
        assert_eq!(accounts[1].name, "Visa Classic");
        assert_eq!(accounts[1].kind, AccountKind::Card);
        assert_eq!(accounts[1].currency, "EUR");
        assert_eq!(accounts[1].filter_key(), "card:22");
    }

    /// Scripts the history view: the collapsed filter popup, the account
    /// selector, date and amount fields, the submit button and a one-row
    /// result table.
    fn install_history_view(page: &mut FakePage) {
        page.state
            .register("", &Locator::xpath(HISTORY_LINK_XPATH), &["history-link"]);
        page.on_click("history-link", |state| {
            state.url = "https://bank.example/history".to_string();
        });

        let state = &mut page.state;
        state.register("", &Locator::class("filterMore"), &["filter-form"]);
        state.hidden.push("filter-form".to_string());
        state.register("", &Locator::class("extendFilterButton"), &["filter-toggle"]);
        state.register("filter-form", &Locator::id("customSelect1"), &["account-select"]);
        state.register(
            "",
            &Locator::xpath("//div[@id='customSelect1_List']//li[@value='account:11']"),
            &["account-option"],
        );
        state.register("filter-form", &Locator::id("filter(fromDate)"), &["from-date"]);
        state.register("filter-form", &Locator::id("filter(toDate)"), &["to-date"]);
        state.register(
            "filter-form",
            &Locator::xpath(".//div[@class=\"amountTitle\"]/input[@class=\"moneyField\"]"),
            &["min-money"],
        );
        state.register(
            "filter-form",
            &Locator::xpath(FILTER_SUBMIT_XPATH),
            &["filter-submit"],
        );
        page.on_click("filter-toggle", |state| {
            state.hidden.retain(|k| k != "filter-form");
        });

        let state = &mut page.state;
        state.register("", &Locator::id("simpleTable0"), &["tbl"]);
        state.register(
            "tbl",
            &Locator::xpath(".//tr[contains(@class, 'ListLine')]"),
            &["row0"],
        );
        state.register(
            "row0",
            &Locator::xpath("./td"),
            &["td0", "td1", "td2", "td3", "td4"],
        );
        state.set_text("td0", "SUPERMARKET 42");
        state.set_text("td3", "Сегодня");
        state.set_text("td4", "120,00 руб.");
    }

    #[test]
    fn collect_transactions_drives_filter_form_and_seals_catalog() {
        let mut page = FakePage::new("about:blank");
        install_login_flow(&mut page);
        page.state
            .register("", &Locator::link_text(DEPOSITS_LINK), &["deposits-link"]);
        page.on_click("deposits-link", |state| {
            state.url = "https://bank.example/deposits".to_string();
            state.register(
                "",
                &Locator::xpath("//div[contains(@class, 'productCover')]"),
                &["cover-dep"],
            );
            install_cover(state, "cover-dep", "Накопительный", "11", "5 000,00 руб.");
        });
        page.state
            .register("", &Locator::link_text(CARDS_LINK), &["cards-link"]);
        page.on_click("cards-link", |state| {
            state.url = "https://bank.example/cards".to_string();
            // No card products; the deposits covers must not leak here.
            state.register(
                "",
                &Locator::xpath("//div[contains(@class, 'productCover')]"),
                &[],
            );
        });
        install_history_view(&mut page);

        let mut session = SessionController::without_sleep(page, credentials(), lookback());
        session.authenticate().expect("authentication");
        session.discover_accounts().expect("discovery");
        session.collect_transactions().expect("collection");

        let to_date = Local::now().date_naive();
        let from_date = to_date - chrono::Duration::days(1);
        {
            let state = &session.page_mut().expect("page still open").state;
            // The collapsed popup was toggled open before filling the form.
            assert!(state.clicked.contains(&"filter-toggle".to_string()));
            assert!(state.clicked.contains(&"account-option".to_string()));
            assert!(state.clicked.contains(&"filter-submit".to_string()));
            assert!(state
                .typed
                .contains(&("min-money".to_string(), "0.01".to_string())));
            assert!(state
                .typed
                .contains(&("from-date".to_string(), parse::filter_date(from_date))));
            assert!(state
                .typed
                .contains(&("to-date".to_string(), parse::filter_date(to_date))));
        }

        let snapshot = session.catalog().snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].1.len(), 1);
        let tx = &snapshot[0].1[0];
        assert_eq!(tx.description, "SUPERMARKET 42");
        assert_eq!(tx.cost, "120.00");
        assert_eq!(tx.currency, "RUB");
        assert_eq!(tx.order_id, 1);
        assert_eq!(tx.time, parse::date_key(to_date));

        // Transaction collection sealed the catalog: re-running discovery
        // must fail on the first put.
        let err = session.discover_accounts().unwrap_err();
        assert!(matches!(
            err,
            SessionError::Catalog(CatalogError::Sealed(_))
        ));
    }

    #[test]
    fn close_is_idempotent_and_quits_once() {
        let mut page = FakePage::new("about:blank");
        install_login_flow(&mut page);
        let mut session = SessionController::without_sleep(page, credentials(), lookback());
        session.authenticate().expect("authentication");
        session.close();
        session.close();
        // The page was taken on first close; second close is a no-op and no
        // operation can reach a dead driver.
        assert!(matches!(
            session.navigate("https://anywhere").unwrap_err(),
            SessionError::NotAuthenticated
        ));
    }
}
