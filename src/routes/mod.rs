// Routes module - routing entry model, validation and script generation

pub mod host;
pub mod install;
pub mod intent;
pub mod parser;
pub mod route;
pub mod rule;
pub mod script;
pub mod table;
pub mod validator;

use std::path::Path;

use crate::error::AppResult;
use host::Host;

/// Tables the kernel ships with; never flushed on removal
pub const BUILTIN_TABLES: [&str; 3] = ["main", "local", "default"];

/// Table used when a route or rule names none
pub const MAIN_TABLE: &str = "main";

pub fn is_builtin_table(name: &str) -> bool {
    BUILTIN_TABLES.contains(&name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntry {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    /// Destination network, absent for a default route
    pub destination: Option<String>,
    pub gateway: Option<String>,
    pub device: Option<String>,
    pub table: Option<String>,
    pub metric: Option<u32>,
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleEntry {
    /// Source network or "all"
    pub from_net: String,
    pub to_net: Option<String>,
    pub fwmark: Option<String>,
    pub iif: Option<String>,
    pub table: Option<String>,
    pub priority: Option<u32>,
}

/// A validated routing entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingEntry {
    Table(TableEntry),
    Route(RouteEntry),
    Rule(RuleEntry),
}

/// Result of applying one entry to the live system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStatus {
    Applied,
    /// Rule already installed; nothing was run
    AlreadyPresent,
}

/// Everything a live apply needs besides the entry itself
pub struct ApplyContext<'a, H: Host + ?Sized> {
    pub host: &'a H,
    pub tables: &'a TableNamespace,
    pub table_name_file: &'a Path,
    pub table_index_offset: u32,
}

impl RoutingEntry {
    /// Tokens of the command that creates or replaces this entry
    pub fn command(&self) -> Vec<String> {
        match self {
            RoutingEntry::Table(table) => table.command(),
            RoutingEntry::Route(route) => route.command(),
            RoutingEntry::Rule(rule) => rule.command(),
        }
    }

    /// Line for the forward script
    pub fn add_line(&self) -> String {
        format!("{}\n", self.command().join(" "))
    }

    /// Line(s) for the reverse script
    pub fn remove_line(&self) -> String {
        match self {
            RoutingEntry::Table(table) => table.remove_line(),
            RoutingEntry::Route(route) => route.remove_line(),
            RoutingEntry::Rule(rule) => rule.remove_line(),
        }
    }

    pub fn apply<H: Host + ?Sized>(&self, ctx: &ApplyContext<'_, H>) -> AppResult<ApplyStatus> {
        match self {
            RoutingEntry::Table(table) => table.apply(ctx),
            RoutingEntry::Route(route) => route.apply(ctx.host),
            RoutingEntry::Rule(rule) => rule.apply(ctx.host),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RoutingEntry::Table(_) => "table",
            RoutingEntry::Route(_) => "route",
            RoutingEntry::Rule(_) => "rule",
        }
    }
}

/// Table names known to one validation pass
#[derive(Debug, Clone, Default)]
pub struct TableNamespace {
    declared: Vec<String>,
}

impl TableNamespace {
    pub fn new() -> Self {
        TableNamespace::default()
    }

    /// Declared by the intent, built-ins included if the intent named them
    pub fn is_declared(&self, name: &str) -> bool {
        self.declared.iter().any(|t| t == name)
    }

    /// True if a route or rule may reference this table
    pub fn resolves(&self, name: &str) -> bool {
        is_builtin_table(name) || self.is_declared(name)
    }

    pub fn declare(&mut self, name: &str) {
        if !self.is_declared(name) {
            self.declared.push(name.to_string());
        }
    }

    /// Non-built-in tables in first-declared order
    pub fn managed(&self) -> impl Iterator<Item = &str> {
        self.declared
            .iter()
            .map(String::as_str)
            .filter(|name| !is_builtin_table(name))
    }
}

/// Ordered, append-only set of validated entries
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Vec<RoutingEntry>,
    tables: TableNamespace,
}

impl Registry {
    pub fn new(tables: TableNamespace) -> Self {
        Registry {
            entries: Vec::new(),
            tables,
        }
    }

    /// Appends unless an entry with the same add line is already present.
    /// Returns whether the entry was added.
    pub fn push(&mut self, entry: RoutingEntry) -> bool {
        let line = entry.add_line();
        if self.entries.iter().any(|e| e.add_line() == line) {
            tracing::debug!("Skipping duplicate {} entry: {}", entry.kind(), line.trim_end());
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn entries(&self) -> &[RoutingEntry] {
        &self.entries
    }

    pub fn tables(&self) -> &TableNamespace {
        &self.tables
    }

    pub(crate) fn tables_mut(&mut self) -> &mut TableNamespace {
        &mut self.tables
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(from: &str, priority: Option<u32>) -> RoutingEntry {
        RoutingEntry::Rule(RuleEntry {
            from_net: from.to_string(),
            to_net: None,
            fwmark: None,
            iif: None,
            table: None,
            priority,
        })
    }

    #[test]
    fn test_registry_dedupes_by_add_line() {
        let mut registry = Registry::default();
        assert!(registry.push(rule("10.0.0.0/24", Some(100))));
        assert!(!registry.push(rule("10.0.0.0/24", Some(100))));
        assert!(registry.push(rule("10.0.0.0/24", Some(101))));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_namespace_builtins_resolve_without_declaration() {
        let mut tables = TableNamespace::new();
        assert!(tables.resolves("main"));
        assert!(tables.resolves("local"));
        assert!(!tables.is_declared("main"));
        assert!(!tables.resolves("SF1"));

        tables.declare("SF1");
        tables.declare("main");
        tables.declare("SF2");
        assert!(tables.resolves("SF1"));
        assert_eq!(tables.managed().collect::<Vec<_>>(), vec!["SF1", "SF2"]);
    }
}
