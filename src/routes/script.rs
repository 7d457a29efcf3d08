// Script generation and live apply over a validated registry

use std::path::Path;

use super::host::Host;
use super::{ApplyContext, ApplyStatus, Registry};
use crate::error::AppError;

pub const SCRIPT_HEADER: &str = "#!/bin/sh\n# This file is managed by advanced-routing.\n";
pub const FLUSH_CACHE: &str = "ip route flush cache\n";

/// Forward script: flush the route cache, then every add line in order
pub fn forward_script(registry: &Registry) -> String {
    let mut script = String::from(SCRIPT_HEADER);
    script.push_str(FLUSH_CACHE);
    for entry in registry.entries() {
        script.push_str(&entry.add_line());
    }
    script
}

/// Reverse script: remove lines last-to-first, then flush the route cache
pub fn reverse_script(registry: &Registry) -> String {
    let mut script = String::from(SCRIPT_HEADER);
    for entry in registry.entries().iter().rev() {
        script.push_str(&entry.remove_line());
    }
    script.push_str(FLUSH_CACHE);
    script
}

/// Outcome of a live apply; the caller decides what a failure means
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub applied: usize,
    pub already_present: usize,
    /// Add line of the failed entry and its error
    pub failures: Vec<(String, AppError)>,
}

impl ApplyReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Apply every entry in registry order, one at a time.
///
/// A failing entry is recorded and the walk continues with the next one.
pub fn apply_all<H: Host + ?Sized>(
    registry: &Registry,
    host: &H,
    table_name_file: &Path,
    table_index_offset: u32,
) -> ApplyReport {
    tracing::info!("Applying {} routing entries", registry.len());
    let ctx = ApplyContext {
        host,
        tables: registry.tables(),
        table_name_file,
        table_index_offset,
    };

    let mut report = ApplyReport::default();
    for entry in registry.entries() {
        match entry.apply(&ctx) {
            Ok(ApplyStatus::Applied) => report.applied += 1,
            Ok(ApplyStatus::AlreadyPresent) => report.already_present += 1,
            Err(e) => {
                let line = entry.add_line().trim_end().to_string();
                tracing::error!("Failed to apply {} entry `{}`: {}", entry.kind(), line, e);
                report.failures.push((line, e));
            }
        }
    }
    report
}
