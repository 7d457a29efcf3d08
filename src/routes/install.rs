// Installing the generated scripts on disk and tearing them down again

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::host::Host;
use super::script::{forward_script, reverse_script};
use super::Registry;
use crate::error::AppResult;

/// Locations of the installed forward/reverse scripts and the table-name file
#[derive(Debug, Clone)]
pub struct ScriptInstaller {
    up_path: PathBuf,
    cleanup_path: PathBuf,
    table_name_file: PathBuf,
}

impl ScriptInstaller {
    /// Scripts go to `<directory>/if-up/<name>` and `<directory>/cleanup/<name>`
    pub fn new(directory: &Path, name: &str, table_name_file: &Path) -> Self {
        ScriptInstaller {
            up_path: directory.join("if-up").join(name),
            cleanup_path: directory.join("cleanup").join(name),
            table_name_file: table_name_file.to_path_buf(),
        }
    }

    pub fn up_path(&self) -> &Path {
        &self.up_path
    }

    pub fn cleanup_path(&self) -> &Path {
        &self.cleanup_path
    }

    pub fn table_name_file(&self) -> &Path {
        &self.table_name_file
    }

    /// Write both scripts, creating their directories if needed
    pub fn write_scripts(&self, registry: &Registry) -> AppResult<()> {
        tracing::info!("Writing {}", self.up_path.display());
        write_executable(&self.up_path, &forward_script(registry))?;

        tracing::info!("Writing {}", self.cleanup_path.display());
        write_executable(&self.cleanup_path, &reverse_script(registry))?;
        Ok(())
    }

    /// Run the installed reverse script, then delete everything we wrote.
    ///
    /// A failing reverse script only warns: the rules may already be gone.
    pub fn remove<H: Host + ?Sized>(&self, host: &H) -> AppResult<()> {
        tracing::info!("Removing routing rules");
        if self.cleanup_path.is_file() {
            let cmd = vec!["sh".to_string(), self.cleanup_path.display().to_string()];
            match host.run(&cmd) {
                Ok(()) => {}
                Err(e) if e.is_recoverable() => tracing::warn!(
                    "cleanup script {} failed. Maybe rules are already gone? Error: {}",
                    self.cleanup_path.display(),
                    e
                ),
                Err(e) => return Err(e),
            }
        }

        for path in [&self.up_path, &self.cleanup_path, &self.table_name_file] {
            match fs::remove_file(path) {
                Ok(()) => tracing::debug!("Removed {}", path.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    tracing::debug!("Nothing to clean up: {}", path.display())
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

fn write_executable(path: &Path, contents: &str) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created {}", parent.display());
        }
    }
    fs::write(path, contents)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    }
    Ok(())
}
