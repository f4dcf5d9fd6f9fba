use anyhow::Context;
use serde_json::json;

use crate::auth::{generate_jwt, Claims};
use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::database::ObjectId;
use crate::types::Platform;

pub fn handle(user_id: &str, platform: &str, role: &str, output_format: OutputFormat) -> anyhow::Result<()> {
    if !ObjectId::is_valid(user_id) {
        anyhow::bail!("user id must be 24 hexadecimal digits");
    }
    let platform: Platform = platform.parse().map_err(anyhow::Error::msg)?;
    let token = generate_jwt(&Claims::new(user_id.to_ascii_lowercase(), platform, role)).context("failed to sign token")?;

    match output_format {
        OutputFormat::Json => output_success(output_format, "Token issued", Some(json!({ "token": token }))),
        OutputFormat::Text => {
            println!("{}", token);
            Ok(())
        }
    }
}
