// Configuration management for advanced-routing
// Supports CLI arguments, config file (TOML), and environment variables

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::Level;

use crate::error::{AppError, AppResult};
use crate::routes::table::DEFAULT_TABLE_INDEX_OFFSET;

/// advanced-routing - turn routing tables, routes and policy rules into iproute2 scripts
#[derive(Parser, Debug, Clone)]
#[command(name = "advanced-routing")]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub action: Action,

    /// Logging level (error, warn, info, debug, trace)
    #[arg(short, long, env = "ADVROUTE_LOG_LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Path to configuration file
    #[arg(short, long, env = "ADVROUTE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// JSON file holding the routing intent
    #[arg(short, long, env = "ADVROUTE_INTENT", global = true)]
    pub intent: Option<PathBuf>,

    /// Directory the forward and reverse scripts are installed under
    #[arg(long, env = "ADVROUTE_SCRIPT_DIR", global = true)]
    pub script_dir: Option<PathBuf>,

    /// iproute2 table-name file to manage
    #[arg(long, env = "ADVROUTE_TABLE_FILE", global = true)]
    pub table_file: Option<PathBuf>,

    /// Refuse to install routes
    #[arg(long, env = "ADVROUTE_DISABLED", global = true)]
    pub disabled: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Validate the routing intent
    Check,
    /// Print the forward and reverse scripts
    Render,
    /// Write the scripts and apply every entry to the live system
    Install,
    /// Run the installed reverse script and delete the managed files
    Remove,
    /// Remove, then install
    Reapply,
}

/// Configuration file structure (TOML format)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfigFile {
    /// Routing intent settings
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Installed script settings
    #[serde(default)]
    pub scripts: ScriptsConfig,

    /// Table-name file settings
    #[serde(default)]
    pub tables: TablesConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Allow installing routes
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Inline JSON intent
    #[serde(default)]
    pub intent: Option<String>,

    /// JSON intent file, used when no inline intent is given
    #[serde(default)]
    pub intent_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptsConfig {
    #[serde(default = "default_script_dir")]
    pub directory: PathBuf,

    /// File name shared by the forward and reverse script
    #[serde(default = "default_script_name")]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TablesConfig {
    #[serde(default = "default_table_name_file")]
    pub name_file: PathBuf,

    /// Numeric id of the first managed table
    #[serde(default = "default_table_index_offset")]
    pub index_offset: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_true() -> bool {
    true
}
fn default_script_dir() -> PathBuf {
    PathBuf::from("/usr/local/lib/advanced-routing")
}
fn default_script_name() -> String {
    "95-advanced-routing".to_string()
}
fn default_table_name_file() -> PathBuf {
    PathBuf::from("/etc/iproute2/rt_tables.d/advanced-routing.conf")
}
fn default_table_index_offset() -> u32 {
    DEFAULT_TABLE_INDEX_OFFSET
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RoutingConfig {
    fn default() -> Self {
        RoutingConfig {
            enabled: default_true(),
            intent: None,
            intent_file: None,
        }
    }
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        ScriptsConfig {
            directory: default_script_dir(),
            name: default_script_name(),
        }
    }
}

impl Default for TablesConfig {
    fn default() -> Self {
        TablesConfig {
            name_file: default_table_name_file(),
            index_offset: default_table_index_offset(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
        }
    }
}

/// Where the routing intent comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentSource {
    Inline(String),
    File(PathBuf),
    Missing,
}

/// Merged configuration from all sources
#[derive(Debug, Clone)]
pub struct Config {
    pub enabled: bool,
    pub intent: IntentSource,
    pub script_dir: PathBuf,
    pub script_name: String,
    pub table_name_file: PathBuf,
    pub table_index_offset: u32,
    pub log_level: Level,
    /// Config file that was read, if any
    pub source: Option<PathBuf>,
}

impl Config {
    /// Load configuration from all sources (CLI args, config file, defaults)
    /// Priority: CLI args > Environment variables > Config file > Defaults
    pub fn load(cli_args: &CliArgs) -> anyhow::Result<Self> {
        let (config_file, source) = if let Some(config_path) = &cli_args.config {
            let config_content = std::fs::read_to_string(config_path)?;
            (toml::from_str::<ConfigFile>(&config_content)?, Some(config_path.clone()))
        } else {
            // Try loading from default locations
            let default_paths = vec![
                PathBuf::from("advanced-routing.toml"),
                PathBuf::from("config.toml"),
            ];

            let mut loaded = (ConfigFile::default(), None);
            for path in default_paths {
                if path.exists() {
                    let config_content = std::fs::read_to_string(&path)?;
                    loaded = (toml::from_str::<ConfigFile>(&config_content)?, Some(path));
                    break;
                }
            }
            loaded
        };

        let mut config = Self::merge(cli_args, config_file)?;
        config.source = source;
        Ok(config)
    }

    /// Merge configuration (CLI args override config file)
    pub fn merge(cli_args: &CliArgs, config_file: ConfigFile) -> anyhow::Result<Self> {
        let enabled = !cli_args.disabled && config_file.routing.enabled;

        let intent = match (&cli_args.intent, config_file.routing.intent, config_file.routing.intent_file) {
            (Some(path), _, _) => IntentSource::File(path.clone()),
            (None, Some(inline), _) => IntentSource::Inline(inline),
            (None, None, Some(path)) => IntentSource::File(path),
            (None, None, None) => IntentSource::Missing,
        };

        let script_dir = cli_args
            .script_dir
            .clone()
            .unwrap_or(config_file.scripts.directory);
        let table_name_file = cli_args
            .table_file
            .clone()
            .unwrap_or(config_file.tables.name_file);

        let log_level = parse_log_level(
            cli_args
                .log_level
                .as_deref()
                .unwrap_or(config_file.logging.level.as_str()),
        )?;

        Ok(Config {
            enabled,
            intent,
            script_dir,
            script_name: config_file.scripts.name,
            table_name_file,
            table_index_offset: config_file.tables.index_offset,
            log_level,
            source: None,
        })
    }

    /// Raw JSON text of the routing intent
    pub fn read_intent(&self) -> AppResult<String> {
        match &self.intent {
            IntentSource::Inline(text) => Ok(text.clone()),
            IntentSource::File(path) => {
                tracing::info!("Reading routing intent from {}", path.display());
                Ok(std::fs::read_to_string(path)?)
            }
            IntentSource::Missing => Err(AppError::Config(
                "no routing intent configured; pass --intent or set routing.intent".to_string(),
            )),
        }
    }
}

fn parse_log_level(level_str: &str) -> anyhow::Result<Level> {
    match level_str.to_lowercase().as_str() {
        "error" => Ok(Level::ERROR),
        "warn" => Ok(Level::WARN),
        "info" => Ok(Level::INFO),
        "debug" => Ok(Level::DEBUG),
        "trace" => Ok(Level::TRACE),
        _ => Err(anyhow::anyhow!("Invalid log level: {}", level_str)),
    }
}
