use serde_json::{json, Value};

use crate::cli::OutputFormat;

/// Output a success message in the appropriate format
pub fn output_success(output_format: &OutputFormat, message: &str, data: Option<Value>) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": true,
                "message": message
            });

            if let Some(data_value) = data {
                response["data"] = data_value;
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
        }
    }
    Ok(())
}

/// Output an error message in the appropriate format
pub fn output_error(output_format: &OutputFormat, message: &str, error_code: Option<&str>) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": false,
                "error": message
            });

            if let Some(code) = error_code {
                response["error_code"] = json!(code);
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            eprintln!("Error: {}", message);
        }
    }
    Ok(())
}

/// Output an empty collection in the appropriate format
pub fn output_empty_collection(
    output_format: &OutputFormat,
    collection_name: &str,
    message: &str,
) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&json!({ collection_name: [] }))?);
        }
        OutputFormat::Text => {
            println!("{}", message);
        }
    }
    Ok(())
}

/// Print a collection as pretty JSON or as a fixed-width table
pub fn output_table(
    output_format: &OutputFormat,
    collection_name: &str,
    items: Value,
    headers: &[(&str, usize)],
    row: impl Fn(&Value) -> Vec<String>,
) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&json!({ collection_name: items }))?);
        }
        OutputFormat::Text => {
            let width: usize = headers.iter().map(|(_, w)| w + 1).sum();
            println!("{}", format_row(headers.iter().map(|(h, _)| h.to_string()).collect(), headers));
            println!("{}", "-".repeat(width));
            for item in items.as_array().into_iter().flatten() {
                println!("{}", format_row(row(item), headers));
            }
        }
    }
    Ok(())
}

fn format_row(cells: Vec<String>, headers: &[(&str, usize)]) -> String {
    cells
        .iter()
        .zip(headers)
        .map(|(cell, (_, width))| format!("{:<width$}", cell, width = *width))
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_padded_to_column_widths() {
        let headers = [("NAME", 6), ("ACTIVE", 6)];
        assert_eq!(
            format_row(vec!["acme".to_string(), "yes".to_string()], &headers),
            "acme   yes"
        );
    }
}
