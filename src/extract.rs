//! Lazy walk of the paginated transaction table for one account. Rows arrive
//! in reverse-chronological order with no explicit day separators; bucketing
//! by day label plus reversed enumeration recovers a stable intra-day ordinal
//! the page itself never provides.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::NaiveDate;

use crate::error::{PageError, SessionError};
use crate::models::{Account, Transaction};
use crate::page::{Locator, Page, WaitCondition};
use crate::parse;
use crate::retry::{Retrier, RetryError};

const NEXT_PAGE_ATTEMPTS: u32 = 3;

fn table() -> Locator {
    Locator::id("simpleTable0")
}

fn empty_marker() -> Locator {
    Locator::xpath("//div[contains(@class, 'emptyText')]")
}

fn pagination() -> Locator {
    Locator::id("pagination")
}

fn page_sizes() -> Locator {
    Locator::xpath("//span[contains(@class, 'paginationSize')]")
}

fn rows() -> Locator {
    Locator::xpath(".//tr[contains(@class, 'ListLine')]")
}

fn cells() -> Locator {
    Locator::xpath("./td")
}

fn paginator_cells() -> Locator {
    Locator::xpath(".//table[contains(@class, 'tblPagin')]//td")
}

fn next_arrow() -> Locator {
    Locator::xpath(".//div[contains(@class, 'activePaginRightArrow')]")
}

/// A row parsed off the page but not yet assigned its day-bucket ordinal.
struct RawRow {
    date: String,
    cost: String,
    currency: String,
    description: String,
}

/// Finite, single-pass sequence of transactions for one account. Not
/// restartable: each page transition advances the underlying view.
pub struct TransactionPages<'a, P: Page> {
    page: &'a mut P,
    account_name: String,
    today: NaiveDate,
    /// Parsed rows of the current page, not yet bucketed.
    pending: VecDeque<RawRow>,
    /// Rows of the current day bucket, in arrival (reverse-chronological) order.
    bucket: Vec<RawRow>,
    bucket_date: String,
    /// Transactions flushed and ready to yield.
    ready: VecDeque<Transaction>,
    finished: bool,
    sleeper: fn(Duration),
}

impl<'a, P: Page> TransactionPages<'a, P> {
    pub fn new(
        page: &'a mut P,
        account: &Account,
        today: NaiveDate,
    ) -> Result<Self, SessionError> {
        Self::with_sleeper(page, account, today, std::thread::sleep)
    }

    pub(crate) fn with_sleeper(
        page: &'a mut P,
        account: &Account,
        today: NaiveDate,
        sleeper: fn(Duration),
    ) -> Result<Self, SessionError> {
        let mut pages = Self {
            page,
            account_name: account.name.clone(),
            today,
            pending: VecDeque::new(),
            bucket: Vec::new(),
            bucket_date: parse::date_key(today),
            ready: VecDeque::new(),
            finished: false,
            sleeper,
        };

        match pages.page.find(&empty_marker()) {
            Ok(_) => {
                log::info!("no new transactions for account {}", pages.account_name);
                pages.finished = true;
                return Ok(pages);
            }
            Err(PageError::NoSuchElement(_)) => {}
            Err(e) => return Err(e.into()),
        }

        pages.maximize_page_size()?;
        pages.load_rows()?;
        Ok(pages)
    }

    /// Selects the largest page size when the pagination control is shown, to
    /// minimize round-trips.
    fn maximize_page_size(&mut self) -> Result<(), SessionError> {
        let control = match self.page.find(&pagination()) {
            Ok(el) => el,
            Err(PageError::NoSuchElement(_)) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if !self.page.is_displayed(&control)? {
            return Ok(());
        }
        let sizes = self.page.find_all(&page_sizes())?;
        if let Some(largest) = sizes.last() {
            self.page.click(largest)?;
        }
        Ok(())
    }

    /// Reads and parses every visible row of the current table page.
    fn load_rows(&mut self) -> Result<(), SessionError> {
        let table = self.page.find(&table())?;
        let row_els = self.page.find_all_in(&table, &rows())?;
        for row_el in row_els {
            let cell_els = self.page.find_all_in(&row_el, &cells())?;
            let mut texts = Vec::with_capacity(cell_els.len());
            for cell in &cell_els {
                texts.push(self.page.text(cell)?);
            }
            self.pending.push_back(parse_row(&texts, self.today)?);
        }
        Ok(())
    }

    /// Assigns ordinals to the buffered day and moves it to the ready queue.
    /// Reversed enumeration from 1: the chronologically-earliest row of the
    /// day (last in arrival order) gets order_id 1.
    fn flush_bucket(&mut self) {
        let count = self.bucket.len();
        log::debug!(
            "flushing {count} transactions for {} on {}",
            self.account_name,
            self.bucket_date
        );
        for (idx, row) in self.bucket.drain(..).enumerate() {
            self.ready.push_back(Transaction {
                order_id: (count - idx) as u32,
                account_name: self.account_name.clone(),
                time: row.date,
                cost: row.cost,
                currency: row.currency,
                description: row.description,
            });
        }
    }

    /// Handles the end of a table page: stop on a missing/hidden/inactive
    /// "next" control, otherwise click through and wait for the fresh table.
    fn advance_page(&mut self) -> Result<(), SessionError> {
        let table_el = self.page.find(&table())?;
        let control = match self.page.find_in(&table_el, &pagination()) {
            Ok(el) => el,
            Err(PageError::NoSuchElement(_)) => {
                self.finished = true;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        if !self.page.is_displayed(&control)? {
            self.finished = true;
            return Ok(());
        }

        let cell = self
            .page
            .find_all_in(&control, &paginator_cells())?
            .into_iter()
            .nth(2)
            .ok_or_else(|| SessionError::Malformed("paginator without a next cell".into()))?;
        let arrow = match self.page.find_in(&cell, &next_arrow()) {
            Ok(el) => el,
            // Single results page: the arrow is simply absent.
            Err(PageError::NoSuchElement(_)) => {
                self.finished = true;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let class = self.page.attr(&arrow, "class")?.unwrap_or_default();
        if class.starts_with("inactive") {
            self.finished = true;
            return Ok(());
        }

        self.page.click(&arrow)?;
        let wait = WaitCondition::ElementPresent(table());
        let page = &mut *self.page;
        let mut retrier = Retrier::with_sleeper(NEXT_PAGE_ATTEMPTS, self.sleeper);
        match retrier.run(|| page.wait_until(&wait), PageError::is_timeout) {
            Ok(()) => {}
            Err(RetryError::Exhausted { attempts, source }) => {
                return Err(SessionError::Exhausted { attempts, source })
            }
            Err(RetryError::Fatal(e)) => return Err(e.into()),
        }
        self.load_rows()
    }

    fn fail(&mut self, err: SessionError) -> Option<Result<Transaction, SessionError>> {
        self.finished = true;
        self.pending.clear();
        self.bucket.clear();
        self.ready.clear();
        Some(Err(err))
    }
}

impl<P: Page> Iterator for TransactionPages<'_, P> {
    type Item = Result<Transaction, SessionError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(tx) = self.ready.pop_front() {
                return Some(Ok(tx));
            }
            if self.finished {
                if self.bucket.is_empty() {
                    return None;
                }
                self.flush_bucket();
                continue;
            }
            if let Some(row) = self.pending.pop_front() {
                if row.date == self.bucket_date {
                    self.bucket.push(row);
                } else {
                    self.flush_bucket();
                    self.bucket_date = row.date.clone();
                    self.bucket.push(row);
                }
                continue;
            }
            if let Err(e) = self.advance_page() {
                return self.fail(e);
            }
        }
    }
}

/// Parses the cell texts of one table row. Column layout is the page's fixed
/// contract: description, _, _, day label, "amount currency".
fn parse_row(texts: &[String], today: NaiveDate) -> Result<RawRow, SessionError> {
    if texts.len() < 5 {
        return Err(SessionError::Malformed(format!(
            "transaction row with {} cells",
            texts.len()
        )));
    }
    let (raw_cost, raw_currency) = texts[4]
        .rsplit_once(' ')
        .ok_or_else(|| SessionError::Malformed(format!("amount cell {:?}", texts[4])))?;
    let description = texts[0]
        .rsplit_once('\n')
        .map(|(head, _)| head)
        .unwrap_or(&texts[0]);
    Ok(RawRow {
        date: parse::parse_day_label(&texts[3], today),
        cost: parse::normalize_amount(raw_cost),
        currency: parse::normalize_currency(raw_currency),
        description: description.to_string(),
    })
}
