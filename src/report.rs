// Result Rendering
// Markdown and JSON renderings of command results

use serde::Serialize;
use std::fmt::Write;

use crate::commands::TableDescription;
use crate::db::registry::ConnectionListing;
use crate::mirror::MirrorResult;

/// Pretty JSON for any serializable result
pub fn render_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(value)
}

pub fn render_mirror_result(result: &MirrorResult) -> String {
    let mut message = String::new();

    match result {
        MirrorResult::Completed(summary) => {
            message.push_str("## Table Mirroring Successful\n\n");
            let _ = writeln!(message, "- Source table: `{}`", summary.source_table);
            let _ = writeln!(message, "- Destination table: `{}`", summary.destination_table);
            let _ = writeln!(message, "- Rows copied: {}", summary.rows_copied);

            if summary.table_created {
                message.push_str("- SQLite table was created\n");
            } else {
                message.push_str("- SQLite table already existed\n");
            }
            if summary.skipped_existing {
                message.push_str("- Existing data was left untouched (overwrite not requested)\n");
            }

            if summary.max_rows_reached {
                let _ = write!(
                    message,
                    "\n**Note:** Maximum row limit of {} was reached. Some rows may not have been copied.",
                    summary.max_rows
                );
            }
        }
        MirrorResult::Failed { error, .. } => {
            message.push_str("## Table Mirroring Failed\n\n");
            let _ = write!(message, "Error: {}", error);
        }
    }

    message
}

pub fn render_connections(listing: &ConnectionListing) -> String {
    let mut message = String::from("## Available ODBC Connections\n\n");

    if let Some(default) = &listing.default_connection {
        let _ = write!(message, "Default connection: `{}`\n\n", default);
    }

    message.push_str("### Connections\n\n");
    for connection in &listing.connections {
        let _ = write!(message, "- `{}`", connection);
        if listing.default_connection.as_deref() == Some(connection.as_str()) {
            message.push_str(" (default)");
        }
        message.push('\n');
    }

    message
}

pub fn render_table_description(description: &TableDescription) -> String {
    let mut message = String::new();
    let _ = write!(message, "## Table `{}`\n\n", description.table);
    message.push_str("| # | Column | Source type | Size | Nullable | SQLite type |\n");
    message.push_str("|---|--------|-------------|------|----------|-------------|\n");

    for entry in &description.columns {
        let column = &entry.column;
        let _ = writeln!(
            message,
            "| {} | {} | {} | {} | {} | {} |",
            column.position,
            column.name,
            column.type_name,
            column.size,
            if column.nullable { "yes" } else { "no" },
            entry.storage_class
        );
    }

    message
}
