//! Rendered-page collaborator boundary. The session and extractor only know
//! this trait; the real implementation lives in `webdriver`.

use std::fmt;

use crate::error::PageError;

/// Structural locator for an element on the rendered page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Id(String),
    ClassName(String),
    PartialLinkText(String),
    XPath(String),
}

impl Locator {
    pub fn id(v: &str) -> Self {
        Locator::Id(v.to_string())
    }

    pub fn class(v: &str) -> Self {
        Locator::ClassName(v.to_string())
    }

    pub fn link_text(v: &str) -> Self {
        Locator::PartialLinkText(v.to_string())
    }

    pub fn xpath(v: &str) -> Self {
        Locator::XPath(v.to_string())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Id(v) => write!(f, "id={v}"),
            Locator::ClassName(v) => write!(f, "class={v}"),
            Locator::PartialLinkText(v) => write!(f, "link-text={v}"),
            Locator::XPath(v) => write!(f, "xpath={v}"),
        }
    }
}

/// Condition for an explicit wait. The per-operation time budget belongs to
/// the implementation, layered under the retrier's own escalating sleeps.
#[derive(Debug, Clone)]
pub enum WaitCondition {
    ElementPresent(Locator),
    /// The current URL differs from the captured one.
    UrlChanged(String),
}

impl fmt::Display for WaitCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitCondition::ElementPresent(loc) => write!(f, "element present: {loc}"),
            WaitCondition::UrlChanged(old) => write!(f, "url change from {old}"),
        }
    }
}

/// Primitive access to the single shared rendered-page resource. Exclusively
/// owned by one `SessionController` for the lifetime of a session.
pub trait Page {
    /// Opaque element handle. Handles may go stale after navigation.
    type Element: Clone;

    fn open(&mut self, url: &str) -> Result<(), PageError>;
    fn current_url(&mut self) -> Result<String, PageError>;

    fn find(&mut self, locator: &Locator) -> Result<Self::Element, PageError>;
    fn find_all(&mut self, locator: &Locator) -> Result<Vec<Self::Element>, PageError>;
    fn find_in(
        &mut self,
        scope: &Self::Element,
        locator: &Locator,
    ) -> Result<Self::Element, PageError>;
    fn find_all_in(
        &mut self,
        scope: &Self::Element,
        locator: &Locator,
    ) -> Result<Vec<Self::Element>, PageError>;

    fn text(&mut self, el: &Self::Element) -> Result<String, PageError>;
    fn attr(&mut self, el: &Self::Element, name: &str) -> Result<Option<String>, PageError>;
    fn is_displayed(&mut self, el: &Self::Element) -> Result<bool, PageError>;

    fn click(&mut self, el: &Self::Element) -> Result<(), PageError>;
    fn clear(&mut self, el: &Self::Element) -> Result<(), PageError>;
    fn send_keys(&mut self, el: &Self::Element, text: &str) -> Result<(), PageError>;

    fn wait_until(&mut self, cond: &WaitCondition) -> Result<(), PageError>;

    /// Releases the underlying browser resource. Must be safe to call once;
    /// the owner never uses the page afterwards.
    fn quit(&mut self);
}
