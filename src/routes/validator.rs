// Routing validator - checks the intent record by record and builds the registry

use std::net::IpAddr;
use std::sync::LazyLock;

use ipnet::IpNet;
use regex::Regex;
use serde_json::Value;

use super::host::Host;
use super::intent::{EntryKind, IntentRecord, RoutingIntent};
use super::rule::is_valid_fwmark;
use super::{MAIN_TABLE, Registry, RouteEntry, RoutingEntry, RuleEntry, TableEntry, TableNamespace};
use crate::error::{AppError, AppResult};

pub const TABLE_NAME_PATTERN: &str = "[a-zA-Z0-9][a-zA-Z0-9-]*";

static TABLE_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^{}$", TABLE_NAME_PATTERN)).expect("table name pattern is valid")
});

fn invalid(msg: String) -> AppError {
    AppError::Validation(msg)
}

/// Accepts a bare address or a CIDR without host bits
pub fn parse_network(text: &str) -> Result<(), String> {
    if text.contains('/') {
        let net: IpNet = text.parse().map_err(|e: ipnet::AddrParseError| e.to_string())?;
        if net.trunc() != net {
            return Err(format!("{} has host bits set", text));
        }
        Ok(())
    } else {
        text.parse::<IpAddr>().map(|_| ()).map_err(|e| e.to_string())
    }
}

/// Non-negative integer given as a JSON number or a numeric string
fn parse_integer(value: &Value) -> Result<u32, String> {
    let parsed = match value {
        Value::Number(n) => n.as_i64().map(i128::from).or_else(|| n.as_u64().map(i128::from)),
        Value::String(s) => s.trim().parse::<i128>().ok(),
        _ => None,
    };
    let Some(n) = parsed else {
        return Err(format!("expected to be integer, got {}", value));
    };
    u32::try_from(n).map_err(|_| format!("{} out of range 0..={}", n, u32::MAX))
}

fn is_default_route(record: &IntentRecord) -> bool {
    matches!(record.get("default_route"), Some(Value::Bool(true)))
}

/// Validates a routing intent against the tables it declares and the host's
/// interfaces, building the registry as it goes.
///
/// Passes run tables, then routes, then rules, so references resolve no
/// matter where a table appears in the input. The first failure aborts.
pub struct RoutingValidator<'h, H: Host + ?Sized> {
    host: &'h H,
    registry: Registry,
}

impl<'h, H: Host + ?Sized> RoutingValidator<'h, H> {
    pub fn new(host: &'h H) -> Self {
        RoutingValidator {
            host,
            registry: Registry::new(TableNamespace::new()),
        }
    }

    /// Run all passes and hand back the registry
    pub fn verify(mut self, intent: &RoutingIntent) -> AppResult<Registry> {
        tracing::info!("Verifying routing intent ({} records)", intent.len());
        if intent.is_empty() {
            tracing::warn!("Routing intent has no entries");
        }

        for kind in EntryKind::PASSES {
            for record in intent.of_kind(kind) {
                tracing::info!("Verifying {} {}", kind.as_str(), record);
                let result = match kind {
                    EntryKind::Table => self.verify_table(record),
                    EntryKind::Route => self.verify_route(record),
                    EntryKind::Rule => self.verify_rule(record),
                };
                if let Err(e) = result {
                    tracing::error!("{}", e);
                    return Err(e);
                }
            }
        }

        tracing::info!("Routing intent valid, {} entries", self.registry.len());
        Ok(self.registry)
    }

    pub fn verify_table(&mut self, record: &IntentRecord) -> AppResult<()> {
        let Some(name) = record.str_field("table")? else {
            return Err(invalid(format!("table entries need the 'table' def in {}", record)));
        };

        if !TABLE_NAME_RE.is_match(name) {
            return Err(invalid(format!(
                "table name {} must match {}.",
                name, TABLE_NAME_PATTERN
            )));
        }
        if self.registry.tables().is_declared(name) {
            return Err(invalid(format!("duplicate table name \"{}\"", name)));
        }

        self.registry.tables_mut().declare(name);
        self.registry.push(RoutingEntry::Table(TableEntry {
            name: name.to_string(),
        }));
        Ok(())
    }

    pub fn verify_route(&mut self, record: &IntentRecord) -> AppResult<()> {
        let gateway = self.verify_route_gateway(record)?;
        let destination = self.verify_route_network(record)?;
        let table = self.verify_table_reference(record)?;
        let is_default = self.verify_route_default_route(record, table.as_deref())?;
        let device = self.verify_route_device(record)?;
        let metric = self.verify_route_metric(record)?;

        if is_default && destination.is_some() {
            tracing::debug!("Ignoring 'net' on default route {}", record);
        }

        self.registry.push(RoutingEntry::Route(RouteEntry {
            destination: if is_default { None } else { destination },
            gateway,
            device,
            table,
            metric,
            is_default,
        }));
        Ok(())
    }

    /// Gateway must be an IP literal; required for default routes
    pub fn verify_route_gateway(&self, record: &IntentRecord) -> AppResult<Option<String>> {
        match record.get("gateway") {
            None if is_default_route(record) => Err(invalid(format!(
                "default routes need the 'gateway' def in {}",
                record
            ))),
            None => Ok(None),
            Some(Value::String(gateway)) => match gateway.parse::<IpAddr>() {
                Ok(_) => Ok(Some(gateway.clone())),
                Err(e) => Err(invalid(format!("Bad gateway IP: {} - {}", gateway, e))),
            },
            Some(other) => Err(invalid(format!(
                "Bad gateway IP: {} - expected a string",
                other
            ))),
        }
    }

    /// `net` is required unless the record asks for a default route
    pub fn verify_route_network(&self, record: &IntentRecord) -> AppResult<Option<String>> {
        match record.get("net") {
            None => match record.get("default_route") {
                Some(Value::Bool(false)) | None => Err(invalid(format!(
                    "routing entries need the 'net' def in {}",
                    record
                ))),
                // type of default_route is checked later
                Some(_) => Ok(None),
            },
            Some(Value::String(net)) => match parse_network(net) {
                Ok(()) => Ok(Some(net.clone())),
                Err(e) => Err(invalid(format!("net {} - {}", net, e))),
            },
            Some(other) => Err(invalid(format!("net {} expected to be a string", other))),
        }
    }

    /// Optional `table`; must be well formed and already known
    pub fn verify_table_reference(&self, record: &IntentRecord) -> AppResult<Option<String>> {
        let Some(table) = record.str_field("table")? else {
            return Ok(None);
        };

        if !TABLE_NAME_RE.is_match(table) {
            return Err(invalid(format!(
                "table name {} must match {} in {}",
                table, TABLE_NAME_PATTERN, record
            )));
        }
        if !self.registry.tables().resolves(table) {
            return Err(invalid(format!("table {} reference not defined", table)));
        }
        Ok(Some(table.to_string()))
    }

    /// A default route must be a real bool and point at a non-main table
    pub fn verify_route_default_route(
        &self,
        record: &IntentRecord,
        table: Option<&str>,
    ) -> AppResult<bool> {
        match record.get("default_route") {
            None | Some(Value::Bool(false)) => Ok(false),
            Some(Value::Bool(true)) => match table {
                None => Err(invalid(format!(
                    "Key 'table' missing in default route {}",
                    record
                ))),
                Some(MAIN_TABLE) => Err(invalid(format!(
                    "Key 'table' cannot be 'main' in default route {}",
                    record
                ))),
                Some(_) => Ok(true),
            },
            Some(other) => Err(invalid(format!(
                "default_route should be bool, got {} in {}",
                other, record
            ))),
        }
    }

    /// Device must exist on the host; without one a gateway is required
    pub fn verify_route_device(&self, record: &IntentRecord) -> AppResult<Option<String>> {
        match record.str_field("device")? {
            Some(device) => {
                if self.host.interface_exists(device)? {
                    Ok(Some(device.to_string()))
                } else {
                    Err(invalid(format!("Device {} does not exist", device)))
                }
            }
            None if record.contains("gateway") => Ok(None),
            None => Err(invalid(format!("Need either 'gateway' or 'device' in {}", record))),
        }
    }

    pub fn verify_route_metric(&self, record: &IntentRecord) -> AppResult<Option<u32>> {
        match record.get("metric") {
            None => Ok(None),
            Some(value) => parse_integer(value)
                .map(Some)
                .map_err(|e| invalid(format!("metric {}", e))),
        }
    }

    pub fn verify_rule(&mut self, record: &IntentRecord) -> AppResult<()> {
        let fwmark = self.verify_rule_fwmark(record)?;
        let from_net = self.verify_rule_from_net(record)?;
        let to_net = self.verify_rule_to_net(record)?;
        let table = self.verify_table_reference(record)?;
        let priority = self.verify_rule_priority(record)?;
        let iif = record.str_field("iif")?.map(String::from);

        self.registry.push(RoutingEntry::Rule(RuleEntry {
            from_net,
            to_net,
            fwmark,
            iif,
            table,
            priority,
        }));
        Ok(())
    }

    /// Checked before anything else so a bad mark is always the reported error
    pub fn verify_rule_fwmark(&self, record: &IntentRecord) -> AppResult<Option<String>> {
        let text = match record.get("fwmark") {
            None => return Ok(None),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };
        if is_valid_fwmark(&text) {
            Ok(Some(text))
        } else {
            Err(invalid(format!("fwmark {} is in the wrong format", text)))
        }
    }

    pub fn verify_rule_from_net(&self, record: &IntentRecord) -> AppResult<String> {
        let Some(from) = record.str_field("from-net")? else {
            return Err(invalid(format!(
                "rule entries need the 'from-net' def in {}",
                record
            )));
        };
        if from != "all" {
            parse_network(from).map_err(|e| invalid(format!("from-net {} - {}", from, e)))?;
        }
        Ok(from.to_string())
    }

    pub fn verify_rule_to_net(&self, record: &IntentRecord) -> AppResult<Option<String>> {
        let Some(to) = record.str_field("to-net")? else {
            return Ok(None);
        };
        if to != "all" {
            parse_network(to).map_err(|e| invalid(format!("to-net {} - {}", to, e)))?;
        }
        Ok(Some(to.to_string()))
    }

    pub fn verify_rule_priority(&self, record: &IntentRecord) -> AppResult<Option<u32>> {
        match record.get("priority") {
            None => Ok(None),
            Some(value) => parse_integer(value)
                .map(Some)
                .map_err(|e| invalid(format!("priority {} in {}", e, record))),
        }
    }
}
