// Route entries: `ip route replace` lines

use super::host::Host;
use super::{ApplyStatus, RouteEntry};
use crate::error::AppResult;

impl RouteEntry {
    /// Build the `ip route replace` command.
    ///
    /// Default route: `default via <gw> table <table>` then `dev`, `metric`.
    /// Otherwise: `<net> [via <gw>]` then `dev`, `table`, `metric`.
    /// Options are emitted only when set, always in that order.
    pub fn command(&self) -> Vec<String> {
        let mut cmd: Vec<String> = ["ip", "route", "replace"].iter().map(|s| s.to_string()).collect();

        if self.is_default {
            cmd.push("default".to_string());
            if let Some(gateway) = &self.gateway {
                cmd.extend(["via".to_string(), gateway.clone()]);
            }
            if let Some(table) = &self.table {
                cmd.extend(["table".to_string(), table.clone()]);
            }
        } else {
            if let Some(destination) = &self.destination {
                cmd.push(destination.clone());
            }
            if let Some(gateway) = &self.gateway {
                cmd.extend(["via".to_string(), gateway.clone()]);
            }
        }

        if let Some(device) = &self.device {
            cmd.extend(["dev".to_string(), device.clone()]);
        }
        if !self.is_default {
            if let Some(table) = &self.table {
                cmd.extend(["table".to_string(), table.clone()]);
            }
        }
        if let Some(metric) = self.metric {
            cmd.extend(["metric".to_string(), metric.to_string()]);
        }

        cmd
    }

    pub fn remove_line(&self) -> String {
        format!("{}\n", self.command().join(" ")).replace(" replace ", " del ")
    }

    pub fn apply<H: Host + ?Sized>(&self, host: &H) -> AppResult<ApplyStatus> {
        host.run(&self.command())?;
        Ok(ApplyStatus::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::host::fake::FakeHost;
    use crate::routes::RoutingEntry;

    fn route() -> RouteEntry {
        RouteEntry {
            destination: Some("6.6.6.0/24".to_string()),
            gateway: Some("10.191.86.2".to_string()),
            device: None,
            table: None,
            metric: None,
            is_default: false,
        }
    }

    #[test]
    fn test_point_route_with_gateway() {
        assert_eq!(
            route().command().join(" "),
            "ip route replace 6.6.6.0/24 via 10.191.86.2"
        );
    }

    #[test]
    fn test_option_order_is_dev_table_metric() {
        let entry = RouteEntry {
            device: Some("eth0".to_string()),
            table: Some("SF1".to_string()),
            metric: Some(50),
            ..route()
        };
        assert_eq!(
            entry.command().join(" "),
            "ip route replace 6.6.6.0/24 via 10.191.86.2 dev eth0 table SF1 metric 50"
        );
    }

    #[test]
    fn test_device_only_route() {
        let entry = RouteEntry {
            destination: Some("1.1.2.0/24".to_string()),
            gateway: None,
            device: Some("eth0".to_string()),
            table: Some("mytable".to_string()),
            ..route()
        };
        assert_eq!(
            entry.command().join(" "),
            "ip route replace 1.1.2.0/24 dev eth0 table mytable"
        );
    }

    #[test]
    fn test_default_route_ignores_destination() {
        let entry = RouteEntry {
            destination: Some("192.170.1.0/24".to_string()),
            gateway: Some("10.191.86.2".to_string()),
            device: Some("eth0".to_string()),
            table: Some("SF1".to_string()),
            metric: Some(101),
            is_default: true,
        };
        assert_eq!(
            entry.command().join(" "),
            "ip route replace default via 10.191.86.2 table SF1 dev eth0 metric 101"
        );
    }

    #[test]
    fn test_remove_line_only_swaps_verb() {
        let entries = [
            route(),
            RouteEntry {
                device: Some("eth0".to_string()),
                metric: Some(7),
                ..route()
            },
            RouteEntry {
                destination: None,
                table: Some("SF1".to_string()),
                is_default: true,
                ..route()
            },
        ];
        for entry in entries {
            let add = RoutingEntry::Route(entry.clone()).add_line();
            assert_eq!(entry.remove_line(), add.replace(" replace ", " del "));
            assert!(entry.remove_line().starts_with("ip route del "));
        }
    }

    #[test]
    fn test_apply_runs_replace() {
        let host = FakeHost::new();
        assert_eq!(route().apply(&host).unwrap(), ApplyStatus::Applied);
        assert_eq!(host.ran(), vec!["ip route replace 6.6.6.0/24 via 10.191.86.2"]);
    }

    #[test]
    fn test_apply_surfaces_failure() {
        let host = FakeHost::new().failing_on("ip route replace");
        assert!(route().apply(&host).is_err());
    }
}
