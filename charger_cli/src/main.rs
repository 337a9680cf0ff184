mod cli;
mod run;

use clap::Parser;
use cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use eyre::WrapErr;
use std::fs;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing(level: &str, logging: &charger_config::Logging) -> eyre::Result<()> {
    let directive = logging.level.as_deref().unwrap_or(level);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directive))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console = fmt::layer().with_target(false);
    let registry = tracing_subscriber::registry().with(filter).with(console);

    if let Some(file) = &logging.file {
        let path = std::path::Path::new(file);
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let name = path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("charger.log"));
        let appender = tracing_appender::rolling::never(dir, name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        registry
            .with(fmt::layer().json().with_writer(writer))
            .init();
    } else {
        registry.init();
    }
    Ok(())
}

fn load_config(path: &std::path::Path) -> eyre::Result<charger_config::Config> {
    let text = fs::read_to_string(path)
        .wrap_err_with(|| format!("reading config {}", path.display()))?;
    charger_config::load_toml(&text).wrap_err_with(|| format!("parsing config {}", path.display()))
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    let config = load_config(&cli.config)?;
    init_tracing(&cli.log_level, &config.logging)?;

    match cli.cmd {
        Commands::CheckConfig => {
            config.validate().wrap_err("config invalid")?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "config": cli.config.display().to_string(),
                        "valid": true,
                        "polling_interval_ms": config.polling.interval_ms,
                        "tracker_enabled": config.tracker.enabled,
                    })
                );
            } else {
                println!("config ok: {}", cli.config.display());
            }
            Ok(())
        }
        Commands::Run {
            sysfs_root,
            fuel_gauge,
            chargers,
            fast_charger,
            capacity_file,
            charger_boot_mode,
            ocv_table,
        } => run::run(
            &config,
            run::RunArgs {
                sysfs_root,
                fuel_gauge,
                chargers,
                fast_charger,
                capacity_file,
                charger_boot_mode,
                ocv_table,
                json: cli.json,
            },
        ),
    }
}
