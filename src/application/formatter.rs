//! Console output for the operator commands.

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Table};

use crate::domain::{LinkPhase, PortEntry, PortKind};

use super::inventory_service::ProxyStatus;

/// Formats the OS port list as a table.
pub fn format_ports_table(ports: &[PortEntry]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["#", "Port", "Kind", "Details"]);

    for (i, port) in ports.iter().enumerate() {
        let kind = match port.kind {
            PortKind::Serial => "serial",
            PortKind::Other => "other (skipped)",
        };

        table.add_row(vec![
            (i + 1).to_string(),
            port.name.clone(),
            kind.to_string(),
            port.description.clone().unwrap_or_else(|| "-".to_string()),
        ]);
    }

    table.to_string()
}

/// Formats an inventory, one tag id per line.
pub fn format_inventory(inventory: &[String]) -> String {
    if inventory.is_empty() {
        return format!("{}", "No tags in the field".dimmed());
    }

    let mut out = format!("{} {} tag(s)\n", "🏷".bold(), inventory.len());
    for id in inventory {
        out.push_str("  ");
        out.push_str(id);
        out.push('\n');
    }
    out
}

/// Formats link status for display.
pub fn format_status(status: &ProxyStatus) -> String {
    let phase = match status.link.phase {
        LinkPhase::Connected => status.link.phase.to_string().green(),
        LinkPhase::Connecting | LinkPhase::Recovering => status.link.phase.to_string().yellow(),
        LinkPhase::Disconnected | LinkPhase::Shutdown => status.link.phase.to_string().red(),
    };

    let power = if status.power_mw < 0 {
        "unknown".to_string()
    } else {
        format!("{} mW", status.power_mw)
    };

    let responding = if status.responding {
        "yes".green()
    } else {
        "no".red()
    };

    format!(
        "{}\n  Phase: {}\n  Responding: {}\n  Port: {}\n  Firmware: {}\n  Power: {}\n  Connects: {}",
        "📡 Reader".bold(),
        phase,
        responding,
        status.link.port.as_deref().unwrap_or("-").cyan(),
        status.link.firmware.as_deref().unwrap_or("-"),
        power,
        status.link.reconnects,
    )
}
