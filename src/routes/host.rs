// Host capability - the live-system queries and commands the core depends on

use std::process::Command;

use super::parser;
use crate::error::{AppError, AppResult};

/// Live network state and command execution.
///
/// The validator asks it which interfaces exist, the rule apply asks it for
/// the installed policy rules, and every apply runs its command through it.
pub trait Host {
    /// Names of the interfaces currently present
    fn interfaces(&self) -> AppResult<Vec<String>>;

    fn interface_exists(&self, name: &str) -> AppResult<bool> {
        Ok(self.interfaces()?.iter().any(|iface| iface == name))
    }

    /// Raw `ip rule` listing, one rule per line
    fn list_rules(&self, ipv6: bool) -> AppResult<String>;

    /// Run a command to completion, failing on a non-zero exit
    fn run(&self, cmd: &[String]) -> AppResult<()>;
}

/// The real host, driven through iproute2
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHost;

impl Host for SystemHost {
    fn interfaces(&self) -> AppResult<Vec<String>> {
        #[cfg(target_os = "linux")]
        {
            if let Ok(entries) = std::fs::read_dir("/sys/class/net") {
                return Ok(entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().to_string())
                    .collect());
            }
        }

        // Fallback to `ip -json link show`
        let output = Command::new("ip")
            .args(["-json", "link", "show"])
            .output()
            .map_err(|e| AppError::HostQuery(format!("Failed to execute ip command: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::HostQuery(format!("ip link show failed: {}", stderr.trim())));
        }

        parser::parse_link_json(&String::from_utf8_lossy(&output.stdout))
    }

    fn list_rules(&self, ipv6: bool) -> AppResult<String> {
        let family = if ipv6 { "-6" } else { "-4" };
        let output = Command::new("ip")
            .args([family, "rule", "show"])
            .output()
            .map_err(|e| AppError::HostQuery(format!("Failed to execute ip command: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::HostQuery(format!("ip rule show failed: {}", stderr.trim())));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run(&self, cmd: &[String]) -> AppResult<()> {
        let (program, args) = cmd
            .split_first()
            .ok_or_else(|| AppError::CommandExecution("empty command".to_string()))?;

        tracing::info!("Running: {}", cmd.join(" "));
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| AppError::CommandExecution(format!("{}: {}", cmd.join(" "), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::CommandExecution(format!(
                "{} exited with {}: {}",
                cmd.join(" "),
                output.status,
                stderr.trim()
            )));
        }

        Ok(())
    }
}
