mod config;
mod error;
mod routes;

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use config::{Action, CliArgs, Config};
use error::AppError;
use routes::host::{Host, SystemHost};
use routes::install::ScriptInstaller;
use routes::intent::RoutingIntent;
use routes::validator::RoutingValidator;
use routes::{Registry, script};

fn main() -> ExitCode {
    let cli_args = CliArgs::parse();
    let config = match Config::load(&cli_args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("advanced-routing: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging; scripts go to stdout so logs go to stderr
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(config.log_level).into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Some(path) = &config.source {
        tracing::info!("Loaded configuration from: {}", path.display());
    }

    match run(cli_args.action, &config, &SystemHost) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            if let Some(app_error) = e.downcast_ref::<AppError>() {
                eprintln!("{}", app_error.user_message());
            }
            ExitCode::FAILURE
        }
    }
}

fn run<H: Host + ?Sized>(action: Action, config: &Config, host: &H) -> anyhow::Result<()> {
    let installer = ScriptInstaller::new(
        &config.script_dir,
        &config.script_name,
        &config.table_name_file,
    );

    match action {
        Action::Check => {
            let registry = validate(config, host)?;
            println!("Routing intent is valid: {} entries", registry.len());
        }
        Action::Render => {
            let registry = validate(config, host)?;
            print!("{}", script::forward_script(&registry));
            println!();
            print!("{}", script::reverse_script(&registry));
        }
        Action::Install => {
            let registry = validated_for_install(config, host)?;
            install(config, host, &installer, &registry)?;
        }
        Action::Remove => {
            installer.remove(host).context("removing installed routes")?;
        }
        Action::Reapply => {
            // Validate before tearing anything down
            let registry = validated_for_install(config, host)?;
            installer.remove(host).context("removing installed routes")?;
            install(config, host, &installer, &registry)?;
        }
    }
    Ok(())
}

fn validate<H: Host + ?Sized>(config: &Config, host: &H) -> anyhow::Result<Registry> {
    let text = config.read_intent()?;
    let intent = RoutingIntent::from_json(&text)?;
    Ok(RoutingValidator::new(host).verify(&intent)?)
}

fn validated_for_install<H: Host + ?Sized>(config: &Config, host: &H) -> anyhow::Result<Registry> {
    if !config.enabled {
        return Err(AppError::Disabled.into());
    }
    validate(config, host)
}

fn install<H: Host + ?Sized>(
    config: &Config,
    host: &H,
    installer: &ScriptInstaller,
    registry: &Registry,
) -> anyhow::Result<()> {
    tracing::info!("Installing routes");
    installer
        .write_scripts(registry)
        .context("writing routing scripts")?;

    tracing::info!(
        "Installed {} and {}",
        installer.up_path().display(),
        installer.cleanup_path().display()
    );

    let report = script::apply_all(
        registry,
        host,
        installer.table_name_file(),
        config.table_index_offset,
    );
    tracing::info!(
        "Applied {} entries, {} already present, {} failed",
        report.applied,
        report.already_present,
        report.failures.len()
    );

    if !report.is_success() {
        anyhow::bail!(
            "{} routing entries could not be applied",
            report.failures.len()
        );
    }
    Ok(())
}
