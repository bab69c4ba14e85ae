//! Shared bits for the record-keeping command line tools. Each tool posts
//! to the HTTP API and exits non-zero on any non-2xx response.

use anyhow::Context;
use reqwest::Response;

pub const DEFAULT_HOST: &str = "http://localhost:8000";

/// Names are entered as loose words; store them capitalized and joined.
/// Each word is normalized to an initial uppercase with the remainder
/// lowercased.
pub fn capitalize_words(words: &[String]) -> String {
    words
        .iter()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Fail the tool with the server's error detail when the call was not a
/// success.
pub async fn check_response(response: Response) -> anyhow::Result<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let detail = response
        .text()
        .await
        .unwrap_or_else(|_| "<no body>".to_owned());
    anyhow::bail!("server responded {status}: {detail}")
}

pub async fn post_json<T: serde::Serialize>(url: &str, body: &T) -> anyhow::Result<()> {
    let response = reqwest::Client::new()
        .post(url)
        .json(body)
        .send()
        .await
        .with_context(|| format!("could not reach {url}"))?;
    check_response(response).await
}
