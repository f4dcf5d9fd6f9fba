use serde_json::{json, Value};

use crate::cli::OutputFormat;

/// Output a success message in the appropriate format
pub fn output_success(output_format: OutputFormat, message: &str, data: Option<Value>) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "status": "SUCCESS",
                "message": message,
                "data": Value::Null
            });
            if let Some(data_value) = data {
                response["data"] = data_value;
            }
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
            if let Some(Value::Object(fields)) = data {
                for (key, value) in fields {
                    match value {
                        Value::String(s) => println!("  {}: {}", key, s),
                        other => println!("  {}: {}", key, other),
                    }
                }
            }
        }
    }
    Ok(())
}

/// Output an error message in the appropriate format
pub fn output_error(output_format: OutputFormat, message: &str, error_code: Option<&str>) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let response = json!({
                "status": error_code.unwrap_or("FAILURE"),
                "message": message,
                "data": Value::Null
            });
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            eprintln!("Error: {}", message);
        }
    }
    Ok(())
}
