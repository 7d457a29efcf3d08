// Parsers for iproute2 output

use crate::error::{AppError, AppResult};

/// One line of `ip rule show`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledRule {
    /// Text before the colon, e.g. "32766"
    pub priority: String,
    /// Everything after the colon, e.g. "from all lookup main"
    pub selector: String,
}

/// Parse `ip rule show` output.
///
/// Each rule is printed as `<priority>:\t<selector>`; lines without a colon
/// are ignored.
pub fn parse_rule_listing(output: &str) -> Vec<InstalledRule> {
    output
        .lines()
        .filter_map(|line| {
            let (priority, selector) = line.trim().split_once(':')?;
            Some(InstalledRule {
                priority: priority.trim().to_string(),
                selector: selector.trim().to_string(),
            })
        })
        .collect()
}

/// Parse interface names from `ip -json link show`
pub fn parse_link_json(json_str: &str) -> AppResult<Vec<String>> {
    let links: Vec<serde_json::Value> = serde_json::from_str(json_str)
        .map_err(|e| AppError::HostQuery(format!("Failed to parse JSON: {}", e)))?;

    Ok(links
        .iter()
        .filter_map(|link| link.get("ifname").and_then(|v| v.as_str()))
        .map(String::from)
        .collect())
}
