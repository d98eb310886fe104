//! W3C WebDriver wire client implementing [`Page`] against a geckodriver
//! endpoint. Thin I/O wrapper: the only state is the endpoint and session id.

use std::time::{Duration, Instant};

use serde_json::{json, Value};

use crate::error::PageError;
use crate::http;
use crate::page::{Locator, Page, WaitCondition};

/// W3C element identifier key in find-element responses.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Per-operation wait budget, layered under the retrier's escalating sleeps.
const WAIT_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct WebDriverSession {
    endpoint: String,
    session_id: String,
}

impl WebDriverSession {
    /// Creates a headless Firefox session on the given WebDriver endpoint.
    pub fn connect(endpoint: &str) -> Result<Self, PageError> {
        let caps = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "firefox",
                    "moz:firefoxOptions": { "args": ["-headless"] },
                    "timeouts": { "pageLoad": WAIT_TIMEOUT.as_millis() as u64 }
                }
            }
        });
        let value = raw_command(&format!("{endpoint}/session"), Some(&caps), Verb::Post)?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| PageError::Driver("no sessionId in new-session reply".to_string()))?
            .to_string();
        log::debug!("webdriver session {session_id} created");
        Ok(Self {
            endpoint: endpoint.to_string(),
            session_id,
        })
    }

    fn command(&self, path: &str, body: Option<&Value>, verb: Verb) -> Result<Value, PageError> {
        let url = format!("{}/session/{}{}", self.endpoint, self.session_id, path);
        raw_command(&url, body, verb)
    }

    fn element_id(value: &Value, locator: &Locator) -> Result<String, PageError> {
        value
            .get(ELEMENT_KEY)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| PageError::Driver(format!("malformed element reply for {locator}")))
    }

    fn find_request(&self, path: &str, locator: &Locator) -> Result<Value, PageError> {
        let (using, value) = strategy(locator);
        self.command(path, Some(&json!({ "using": using, "value": value })), Verb::Post)
    }
}

enum Verb {
    Get,
    Post,
    Delete,
}

/// Maps a locator onto a W3C location strategy. Ids go through an attribute
/// selector because real ids on the page contain parentheses.
fn strategy(locator: &Locator) -> (&'static str, String) {
    match locator {
        Locator::Id(v) => ("css selector", format!("[id=\"{v}\"]")),
        Locator::ClassName(v) => ("css selector", format!(".{v}")),
        Locator::PartialLinkText(v) => ("partial link text", v.clone()),
        Locator::XPath(v) => ("xpath", v.clone()),
    }
}

fn raw_command(url: &str, body: Option<&Value>, verb: Verb) -> Result<Value, PageError> {
    let reply = match verb {
        Verb::Get => http::get(url),
        Verb::Post => http::post_json(url, body.unwrap_or(&json!({}))),
        Verb::Delete => http::delete(url),
    }
    .map_err(|e| PageError::Driver(e.to_string()))?;

    let parsed: Value = serde_json::from_str(&reply.body)
        .map_err(|e| PageError::Driver(format!("bad driver reply: {e}")))?;
    let value = parsed.get("value").cloned().unwrap_or(Value::Null);

    if !reply.status.is_success() {
        let error = value.get("error").and_then(Value::as_str).unwrap_or("");
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or(&reply.body);
        return Err(match error {
            "no such element" | "stale element reference" => {
                PageError::NoSuchElement(message.to_string())
            }
            "timeout" | "script timeout" => PageError::Wait(message.to_string()),
            _ => PageError::Driver(format!("{error}: {message}")),
        });
    }
    Ok(value)
}

impl Page for WebDriverSession {
    type Element = String;

    fn open(&mut self, url: &str) -> Result<(), PageError> {
        self.command("/url", Some(&json!({ "url": url })), Verb::Post)?;
        Ok(())
    }

    fn current_url(&mut self) -> Result<String, PageError> {
        let value = self.command("/url", None, Verb::Get)?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| PageError::Driver("current url is not a string".to_string()))
    }

    fn find(&mut self, locator: &Locator) -> Result<String, PageError> {
        let value = self.find_request("/element", locator)?;
        Self::element_id(&value, locator)
    }

    fn find_all(&mut self, locator: &Locator) -> Result<Vec<String>, PageError> {
        let value = self.find_request("/elements", locator)?;
        collect_elements(&value, locator)
    }

    fn find_in(&mut self, scope: &String, locator: &Locator) -> Result<String, PageError> {
        let value = self.find_request(&format!("/element/{scope}/element"), locator)?;
        Self::element_id(&value, locator)
    }

    fn find_all_in(&mut self, scope: &String, locator: &Locator) -> Result<Vec<String>, PageError> {
        let value = self.find_request(&format!("/element/{scope}/elements"), locator)?;
        collect_elements(&value, locator)
    }

    fn text(&mut self, el: &String) -> Result<String, PageError> {
        let value = self.command(&format!("/element/{el}/text"), None, Verb::Get)?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    fn attr(&mut self, el: &String, name: &str) -> Result<Option<String>, PageError> {
        let value = self.command(&format!("/element/{el}/attribute/{name}"), None, Verb::Get)?;
        Ok(value.as_str().map(str::to_string))
    }

    fn is_displayed(&mut self, el: &String) -> Result<bool, PageError> {
        let value = self.command(&format!("/element/{el}/displayed"), None, Verb::Get)?;
        Ok(value.as_bool().unwrap_or(false))
    }

    fn click(&mut self, el: &String) -> Result<(), PageError> {
        self.command(&format!("/element/{el}/click"), None, Verb::Post)?;
        Ok(())
    }

    fn clear(&mut self, el: &String) -> Result<(), PageError> {
        self.command(&format!("/element/{el}/clear"), None, Verb::Post)?;
        Ok(())
    }

    fn send_keys(&mut self, el: &String, text: &str) -> Result<(), PageError> {
        self.command(
            &format!("/element/{el}/value"),
            Some(&json!({ "text": text })),
            Verb::Post,
        )?;
        Ok(())
    }

    /// Client-side polling wait, the way WebDriverWait does it.
    fn wait_until(&mut self, cond: &WaitCondition) -> Result<(), PageError> {
        let deadline = Instant::now() + WAIT_TIMEOUT;
        loop {
            let met = match cond {
                WaitCondition::ElementPresent(locator) => match self.find(locator) {
                    Ok(_) => true,
                    Err(PageError::NoSuchElement(_)) => false,
                    Err(e) => return Err(e),
                },
                WaitCondition::UrlChanged(old) => self.current_url()? != *old,
            };
            if met {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(PageError::Wait(cond.to_string()));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn quit(&mut self) {
        if let Err(e) = self.command("", None, Verb::Delete) {
            log::debug!("webdriver session delete failed: {e}");
        }
    }
}

fn collect_elements(value: &Value, locator: &Locator) -> Result<Vec<String>, PageError> {
    value
        .as_array()
        .ok_or_else(|| PageError::Driver(format!("malformed elements reply for {locator}")))?
        .iter()
        .map(|v| WebDriverSession::element_id(v, locator))
        .collect()
}
