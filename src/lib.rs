//! Headless collector for Sberbank online banking. Drives an authenticated
//! session through a WebDriver endpoint, extracts accounts and their
//! transactions from the paginated history view, and ships both to a remote
//! budget-tracker collector.

pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod extract;
mod http;
pub mod models;
pub mod page;
pub mod parse;
pub mod retry;
pub mod runner;
pub mod session;
pub mod webdriver;

pub use catalog::AccountCatalog;
pub use config::Config;
pub use error::{CatalogError, DispatchError, PageError, SessionError, TransportError};
pub use models::{Account, AccountKind, Transaction};
pub use session::SessionController;
