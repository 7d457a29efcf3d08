// Routing table entries and the iproute2 table-name file

use std::fs;
use std::path::Path;

use super::host::Host;
use super::{ApplyContext, ApplyStatus, TableEntry, TableNamespace, is_builtin_table};
use crate::error::AppResult;

/// First numeric id handed out to a managed table
pub const DEFAULT_TABLE_INDEX_OFFSET: u32 = 100;

impl TableEntry {
    /// Tables have no creation command; the forward script just records them
    pub fn command(&self) -> Vec<String> {
        vec![
            "#".to_string(),
            "Table:".to_string(),
            "name".to_string(),
            self.name.clone(),
        ]
    }

    /// Flush the table and drop rules pointing at it.
    /// Built-in tables are left alone.
    pub fn remove_line(&self) -> String {
        if is_builtin_table(&self.name) {
            tracing::debug!("Skip remove line for builtin table {}", self.name);
            return format!("# Skip removing builtin table {}\n", self.name);
        }
        format!(
            "ip route flush table {table}\nip rule del table {table}\n",
            table = self.name
        )
    }

    /// Rewrites the whole table-name file, not just this table's line
    pub fn apply<H: Host + ?Sized>(&self, ctx: &ApplyContext<'_, H>) -> AppResult<ApplyStatus> {
        write_table_names(ctx.table_name_file, ctx.tables, ctx.table_index_offset)?;
        Ok(ApplyStatus::Applied)
    }
}

/// Render `<id> <name>` lines for every managed table
pub fn render_table_names(tables: &TableNamespace, offset: u32) -> String {
    tables
        .managed()
        .zip(offset..)
        .map(|(name, id)| format!("{} {}\n", id, name))
        .collect()
}

pub fn write_table_names(path: &Path, tables: &TableNamespace, offset: u32) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    tracing::info!("Writing table names to {}", path.display());
    fs::write(path, render_table_names(tables, offset))?;
    Ok(())
}
