use anyhow::Context;
use serde_json::Value;

use crate::cli::utils::{output_error, output_success};
use crate::cli::OutputFormat;
use crate::config::config;

pub async fn handle(url: Option<String>, output_format: OutputFormat) -> anyhow::Result<()> {
    let base = url.unwrap_or_else(|| format!("http://localhost:{}", config().api.port));
    let endpoint = format!("{}/health", base.trim_end_matches('/'));

    let response = reqwest::get(&endpoint)
        .await
        .with_context(|| format!("failed to reach {}", endpoint))?;
    let status = response.status();
    let body: Value = response.json().await.context("health response was not JSON")?;

    if status.is_success() {
        output_success(output_format, &format!("{} is healthy", base), body.get("data").cloned())
    } else {
        let message = body.get("message").and_then(Value::as_str).unwrap_or("unhealthy");
        output_error(output_format, &format!("{} returned {}: {}", base, status, message), Some("SERVER_ERROR"))?;
        anyhow::bail!("server unhealthy")
    }
}
