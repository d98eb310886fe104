//! Shared blocking HTTP plumbing: one reqwest client and one runtime for the
//! whole process, used by both the WebDriver wire client and the dispatcher.

use once_cell::sync::Lazy;
use reqwest::StatusCode;
use serde_json::Value;

static CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .expect("reqwest client")
});

static RUNTIME: Lazy<tokio::runtime::Runtime> =
    Lazy::new(|| tokio::runtime::Runtime::new().expect("tokio runtime"));

pub(crate) struct Reply {
    pub status: StatusCode,
    pub body: String,
}

pub(crate) fn post_json(url: &str, body: &Value) -> Result<Reply, reqwest::Error> {
    RUNTIME.block_on(async {
        let resp = CLIENT.post(url).json(body).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        Ok(Reply { status, body })
    })
}

pub(crate) fn get(url: &str) -> Result<Reply, reqwest::Error> {
    RUNTIME.block_on(async {
        let resp = CLIENT.get(url).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        Ok(Reply { status, body })
    })
}

pub(crate) fn delete(url: &str) -> Result<Reply, reqwest::Error> {
    RUNTIME.block_on(async {
        let resp = CLIENT.delete(url).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        Ok(Reply { status, body })
    })
}
