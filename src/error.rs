//! Error taxonomy: page-level failures, session-fatal errors, catalog misuse, dispatch.

use thiserror::Error;

/// Failure reported by the rendered-page collaborator.
#[derive(Debug, Error)]
pub enum PageError {
    /// A wait or page load ran out of its per-operation time budget. Retryable.
    #[error("timed out waiting for {0}")]
    Wait(String),
    #[error("no such element: {0}")]
    NoSuchElement(String),
    /// Anything else the driver reports (protocol error, dead session, bad response).
    #[error("webdriver: {0}")]
    Driver(String),
}

impl PageError {
    /// The retryable-transient classification used by every retry site.
    pub fn is_timeout(&self) -> bool {
        matches!(self, PageError::Wait(_))
    }
}

/// Session-level errors. `Exhausted` and anything surfaced from
/// `authenticate`/`navigate` are fatal for the session: the controller has
/// already closed itself by the time the caller sees them.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Operation requires an authenticated session (never authenticated, or closed).
    #[error("not authenticated")]
    NotAuthenticated,
    /// A retry budget ran out. Carries the last underlying error as cause.
    #[error("{attempts} retry attempts exhausted")]
    Exhausted {
        attempts: u32,
        #[source]
        source: PageError,
    },
    #[error(transparent)]
    Page(#[from] PageError),
    /// A scraped element was missing a piece the record needs.
    #[error("malformed page data: {0}")]
    Malformed(String),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("account discovery is closed, cannot add {0}")]
    Sealed(String),
    #[error("account {0} already discovered")]
    Duplicate(String),
    #[error("unknown account: {0}")]
    UnknownAccount(String),
}

/// Failure from the outbound transport collaborator.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not reach the collector at all. Retryable.
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("transport: {0}")]
    Other(String),
}

impl TransportError {
    pub fn is_connect(&self) -> bool {
        matches!(self, TransportError::Connect(_))
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{attempts} send attempts exhausted")]
    Exhausted {
        attempts: u32,
        #[source]
        source: TransportError,
    },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("payload encoding: {0}")]
    Encode(#[from] serde_json::Error),
}
