//! Supervisor assembly: config mapping, backend wiring, poller lifecycle.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc;

use charger_core::{CAP_POLL_PERIOD, ChargerDesc, ChargerSupervisor, Poller, SupervisorRegistry};
use charger_hardware::{FileCapacityStore, SysfsCharger, SysfsFastCharger, SysfsFuelGauge};
use charger_traits::{EventKind, EventSink};
use eyre::WrapErr;

/// Event sink printing to stdout, one line per event.
struct ConsoleSink {
    json: bool,
}

impl EventSink for ConsoleSink {
    fn deliver(&mut self, kind: EventKind, message: &str) {
        if self.json {
            println!(
                "{}",
                serde_json::json!({ "event": format!("{kind:?}"), "message": message })
            );
        } else {
            println!("[{kind:?}] {message}");
        }
    }
}

pub struct RunArgs {
    pub sysfs_root: PathBuf,
    pub fuel_gauge: String,
    pub chargers: Vec<String>,
    pub fast_charger: Option<String>,
    pub capacity_file: Option<PathBuf>,
    pub charger_boot_mode: bool,
    pub ocv_table: Option<PathBuf>,
    pub json: bool,
}

fn build_supervisor(
    config: &charger_config::Config,
    args: &RunArgs,
) -> eyre::Result<ChargerSupervisor> {
    // The CSV table replaces the TOML one before validation so a
    // CSV-only setup still passes the tracker checks.
    let mut config = config.clone();
    if let Some(csv) = &args.ocv_table {
        config.tracker.ocv_table =
            charger_config::load_ocv_table_csv(csv).wrap_err("loading ocv table")?;
    }
    let desc = ChargerDesc::from_config(&config).wrap_err("mapping config")?;

    let root: &Path = &args.sysfs_root;
    let mut names = args.chargers.iter();
    let main = names
        .next()
        .ok_or_else(|| eyre::eyre!("at least one --charger is required"))?;

    let builder = ChargerSupervisor::builder()
        .with_fuel_gauge(SysfsFuelGauge::new(root.join(&args.fuel_gauge)))
        .with_charger(SysfsCharger::new(root.join(main)));
    let mut builder = builder.with_desc(desc);
    for name in names {
        builder = builder.with_second_charger(SysfsCharger::new(root.join(name)));
    }
    if let Some(name) = &args.fast_charger {
        builder = builder.with_fast_charger(SysfsFastCharger::new(root.join(name)));
    }
    if let Some(path) = &args.capacity_file {
        builder = builder.with_capacity_store(FileCapacityStore::new(path));
    }
    builder = builder
        .with_event_sink(ConsoleSink { json: args.json })
        .with_charger_boot_mode(args.charger_boot_mode);

    builder.build().wrap_err("building charging supervisor")
}

pub fn run(config: &charger_config::Config, args: RunArgs) -> eyre::Result<()> {
    let supervisor = build_supervisor(config, &args)?;

    let registry = Arc::new(SupervisorRegistry::new());
    registry.register(supervisor);

    // Evaluate the charging state once right away, then hand over to the
    // timer-driven pollers.
    registry.poll_all();
    registry.capacity_poll_all();
    let monitor = Poller::spawn_monitor(registry.clone());
    let capacity = Poller::spawn_capacity(registry.clone(), CAP_POLL_PERIOD);

    let (tx, rx) = mpsc::channel::<()>();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .wrap_err("installing signal handler")?;

    tracing::info!("charging supervisor running, Ctrl-C to stop");
    let _ = rx.recv();
    tracing::info!("shutting down");

    drop(monitor);
    drop(capacity);
    Ok(())
}
