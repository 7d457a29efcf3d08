// Policy rule entries and duplicate detection against the live rule list

use std::sync::LazyLock;

use regex::Regex;

use super::host::Host;
use super::parser::{self, InstalledRule};
use super::{ApplyStatus, MAIN_TABLE, RuleEntry};
use crate::error::AppResult;

/// Decimal or hex mark, optionally followed by a hex mask
static FWMARK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,13}|0[xX][0-9a-fA-F]{1,8})(?:/(0[xX][0-9a-fA-F]{1,8}))?$")
        .expect("fwmark pattern is valid")
});

pub fn is_valid_fwmark(fwmark: &str) -> bool {
    FWMARK_RE.is_match(fwmark)
}

/// Mask the kernel leaves out of `ip rule show`
const FULL_MARK_MASK: u64 = 0xffff_ffff;

/// Rewrite a fwmark the way `ip rule show` prints it (`16/0xFF` -> `0x10/0xff`).
///
/// A full mask is dropped (`0x10/0xffffffff` -> `0x10`).
pub fn fwmark_hex(fwmark: &str) -> Option<String> {
    let caps = FWMARK_RE.captures(fwmark)?;
    let mark = parse_mark_number(caps.get(1)?.as_str())?;
    match caps.get(2) {
        None => Some(format!("{:#x}", mark)),
        Some(mask) => match parse_mark_number(mask.as_str())? {
            FULL_MARK_MASK => Some(format!("{:#x}", mark)),
            mask => Some(format!("{:#x}/{:#x}", mark, mask)),
        },
    }
}

fn parse_mark_number(text: &str) -> Option<u64> {
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

/// `0.0.0.0/0` and `::/0` select every address, same as "all"
fn is_any_network(net: &str) -> bool {
    net == "all" || net.ends_with("/0")
}

/// `ip rule show` prints host prefixes without their length and a
/// zero-length prefix as "all"
fn listed_network(net: &str) -> &str {
    if is_any_network(net) {
        return "all";
    }
    net.strip_suffix("/32")
        .filter(|addr| !addr.contains(':'))
        .or_else(|| net.strip_suffix("/128").filter(|addr| addr.contains(':')))
        .unwrap_or(net)
}

impl RuleEntry {
    /// Build the `ip rule add` command.
    ///
    /// `from` comes first, then fwmark, iif, to, table and priority when set.
    pub fn command(&self) -> Vec<String> {
        let mut cmd: Vec<String> = ["ip", "rule", "add", "from"].iter().map(|s| s.to_string()).collect();
        cmd.push(self.from_net.clone());

        let opts = [
            ("fwmark", self.fwmark.clone()),
            ("iif", self.iif.clone()),
            ("to", self.to_net.clone()),
            ("table", self.table.clone()),
            ("priority", self.priority.map(|p| p.to_string())),
        ];
        for (keyword, value) in opts {
            if let Some(value) = value {
                cmd.extend([keyword.to_string(), value]);
            }
        }
        cmd
    }

    pub fn remove_line(&self) -> String {
        format!("{}\n", self.command().join(" ")).replace(" add ", " del ")
    }

    /// Selector text as `ip rule show` would print it for this rule
    pub fn match_line(&self) -> String {
        let mut params = vec!["from".to_string(), listed_network(&self.from_net).to_string()];

        if let Some(to) = self.to_net.as_deref().filter(|to| !is_any_network(to)) {
            params.extend(["to".to_string(), listed_network(to).to_string()]);
        }
        if let Some(fwmark) = &self.fwmark {
            let shown = fwmark_hex(fwmark).unwrap_or_else(|| fwmark.clone());
            params.extend(["fwmark".to_string(), shown]);
        }
        if let Some(iif) = &self.iif {
            params.extend(["iif".to_string(), iif.clone()]);
        }
        params.extend([
            "lookup".to_string(),
            self.table.clone().unwrap_or_else(|| MAIN_TABLE.to_string()),
        ]);
        params.join(" ")
    }

    /// True if an installed rule has our priority and ends with our selector
    pub fn is_duplicate(&self, installed: &[InstalledRule]) -> bool {
        let matchline = self.match_line();
        let priority = self.priority.map(|p| p.to_string());
        let found = installed.iter().any(|rule| {
            priority.as_deref().is_none_or(|p| rule.priority == p) && rule.selector.ends_with(&matchline)
        });
        if found {
            tracing::debug!("Found dup rule: {}", matchline);
        }
        found
    }

    pub fn is_ipv6(&self) -> bool {
        self.from_net.contains(':') || self.to_net.as_deref().is_some_and(|to| to.contains(':'))
    }

    /// `ip rule add` has no replace form, so skip rules already installed
    pub fn apply<H: Host + ?Sized>(&self, host: &H) -> AppResult<ApplyStatus> {
        let listing = host.list_rules(self.is_ipv6())?;
        if self.is_duplicate(&parser::parse_rule_listing(&listing)) {
            return Ok(ApplyStatus::AlreadyPresent);
        }
        host.run(&self.command())?;
        Ok(ApplyStatus::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::host::fake::FakeHost;
    use crate::routes::RoutingEntry;

    const BASE_RULES: &str = "0:\tfrom all lookup local\n\
                              32766:\tfrom all lookup main\n\
                              32767:\tfrom all lookup default\n";

    fn rule(from: &str) -> RuleEntry {
        RuleEntry {
            from_net: from.to_string(),
            to_net: None,
            fwmark: None,
            iif: None,
            table: None,
            priority: None,
        }
    }

    #[test]
    fn test_command_option_order() {
        let entry = RuleEntry {
            to_net: Some("10.0.0.0/24".to_string()),
            fwmark: Some("0x1/0xF".to_string()),
            iif: Some("bond0".to_string()),
            table: Some("mytable".to_string()),
            priority: Some(100),
            ..rule("all")
        };
        assert_eq!(
            entry.command().join(" "),
            "ip rule add from all fwmark 0x1/0xF iif bond0 to 10.0.0.0/24 table mytable priority 100"
        );
    }

    #[test]
    fn test_remove_line_only_swaps_verb() {
        let entry = RuleEntry {
            to_net: Some("192.170.2.0/24".to_string()),
            table: Some("SF1".to_string()),
            priority: Some(101),
            ..rule("192.170.2.0/24")
        };
        let add = RoutingEntry::Rule(entry.clone()).add_line();
        assert_eq!(entry.remove_line(), add.replace(" add ", " del "));
        assert_eq!(
            entry.remove_line(),
            "ip rule del from 192.170.2.0/24 to 192.170.2.0/24 table SF1 priority 101\n"
        );
    }

    #[test]
    fn test_fwmark_grammar() {
        for good in ["1", "0x10", "0X1f/0xff", "1234567890123", "0xffffffff/0XFFFFFFFF"] {
            assert!(is_valid_fwmark(good), "{} should be valid", good);
        }
        for bad in ["abc", "1 0x0f", "99999999999999", "0x1000000000", "2/0x1000000000", "1/1", "0|1", ""] {
            assert!(!is_valid_fwmark(bad), "{} should be invalid", bad);
        }
    }

    #[test]
    fn test_fwmark_hex() {
        assert_eq!(fwmark_hex("16").as_deref(), Some("0x10"));
        assert_eq!(fwmark_hex("0x10/0xFF").as_deref(), Some("0x10/0xff"));
        assert_eq!(fwmark_hex("1/0xf").as_deref(), Some("0x1/0xf"));
        assert_eq!(fwmark_hex("bogus"), None);
    }

    #[test]
    fn test_fwmark_hex_drops_full_mask() {
        assert_eq!(fwmark_hex("0x10/0xffffffff").as_deref(), Some("0x10"));
        assert_eq!(fwmark_hex("16/0XFFFFFFFF").as_deref(), Some("0x10"));
        assert_eq!(fwmark_hex("0x10/0xfffffffe").as_deref(), Some("0x10/0xfffffffe"));
    }

    #[test]
    fn test_not_duplicate_when_absent() {
        let entry = RuleEntry {
            priority: Some(100),
            ..rule("10.0.0.0/24")
        };
        assert!(!entry.is_duplicate(&parser::parse_rule_listing(BASE_RULES)));
    }

    #[test]
    fn test_duplicate_omits_to_all() {
        let entry = RuleEntry {
            to_net: Some("all".to_string()),
            table: Some("SF1".to_string()),
            priority: Some(101),
            ..rule("10.0.0.0/24")
        };
        let listing = format!("{}101:\tfrom 10.0.0.0/24 lookup SF1\n", BASE_RULES);
        assert!(entry.is_duplicate(&parser::parse_rule_listing(&listing)));
    }

    #[test]
    fn test_duplicate_with_fwmark_and_iif() {
        let entry = RuleEntry {
            to_net: Some("10.0.0.0/24".to_string()),
            fwmark: Some("0x10/0xff".to_string()),
            iif: Some("lo".to_string()),
            table: Some("SF1".to_string()),
            priority: Some(100),
            ..rule("all")
        };
        let listing = format!(
            "{}100:\tfrom all to 10.0.0.0/24 fwmark 0x10/0xff iif lo lookup SF1\n",
            BASE_RULES
        );
        assert!(entry.is_duplicate(&parser::parse_rule_listing(&listing)));
    }

    #[test]
    fn test_priority_must_match_exactly() {
        let entry = RuleEntry {
            table: Some("SF1".to_string()),
            priority: Some(10),
            ..rule("10.0.0.0/24")
        };
        let listing = "101:\tfrom 10.0.0.0/24 lookup SF1\n";
        assert!(!entry.is_duplicate(&parser::parse_rule_listing(listing)));
    }

    #[test]
    fn test_no_priority_matches_any_priority() {
        let entry = rule("10.0.0.0/24");
        let listing = "32765:\tfrom 10.0.0.0/24 lookup main\n";
        assert!(entry.is_duplicate(&parser::parse_rule_listing(listing)));
    }

    #[test]
    fn test_host_prefix_listed_bare() {
        let entry = RuleEntry {
            to_net: Some("1.1.1.1/32".to_string()),
            priority: Some(100),
            ..rule("10.205.6.0/24")
        };
        assert_eq!(entry.match_line(), "from 10.205.6.0/24 to 1.1.1.1 lookup main");
    }

    #[test]
    fn test_zero_length_prefixes_listed_as_all() {
        let entry = RuleEntry {
            to_net: Some("0.0.0.0/0".to_string()),
            table: Some("SF1".to_string()),
            priority: Some(100),
            ..rule("0.0.0.0/0")
        };
        assert_eq!(entry.match_line(), "from all lookup SF1");

        let entry = RuleEntry {
            to_net: Some("::/0".to_string()),
            ..rule("::/0")
        };
        assert_eq!(entry.match_line(), "from all lookup main");
    }

    #[test]
    fn test_apply_skips_installed_default_prefix_rule() {
        let entry = RuleEntry {
            table: Some("SF1".to_string()),
            priority: Some(100),
            ..rule("0.0.0.0/0")
        };
        let host = FakeHost::new().with_rules(&format!("{}100:\tfrom all lookup SF1\n", BASE_RULES));
        assert_eq!(entry.apply(&host).unwrap(), ApplyStatus::AlreadyPresent);
        assert!(host.ran().is_empty());
    }

    #[test]
    fn test_apply_skips_installed_full_mask_rule() {
        let entry = RuleEntry {
            fwmark: Some("0x10/0xffffffff".to_string()),
            table: Some("SF1".to_string()),
            priority: Some(100),
            ..rule("all")
        };
        let host = FakeHost::new().with_rules("100:\tfrom all fwmark 0x10 lookup SF1\n");
        assert_eq!(entry.apply(&host).unwrap(), ApplyStatus::AlreadyPresent);
        assert!(host.ran().is_empty());
    }

    #[test]
    fn test_apply_skips_installed_rule() {
        let entry = RuleEntry {
            table: Some("SF1".to_string()),
            priority: Some(101),
            ..rule("10.0.0.0/24")
        };
        let host = FakeHost::new().with_rules("101:\tfrom 10.0.0.0/24 lookup SF1\n");
        assert_eq!(entry.apply(&host).unwrap(), ApplyStatus::AlreadyPresent);
        assert!(host.ran().is_empty());
    }

    #[test]
    fn test_apply_adds_missing_rule() {
        let entry = RuleEntry {
            priority: Some(100),
            ..rule("10.0.0.0/24")
        };
        let host = FakeHost::new().with_rules(BASE_RULES);
        assert_eq!(entry.apply(&host).unwrap(), ApplyStatus::Applied);
        assert_eq!(host.ran(), vec!["ip rule add from 10.0.0.0/24 priority 100"]);
    }
}
