use netsentry::cli::Cli;
use netsentry::config::Config;
use netsentry::inventory::{FileInventoryStore, InventoryStore};
use netsentry::logging::EventLogger;
use netsentry::manager::MonitorManager;
use netsentry::metrics::{AlertStateStore, MetricProcessor};
use netsentry::notifications::PushoverClient;
use netsentry::persistence::PersistenceFacade;
use netsentry::probes::icmp::RealIcmpDriver;
use netsentry::probes::snmp::RealSnmpDriver;
use std::sync::Arc;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse_args();
    let config = Config::load(&cli.config)?;

    let inventory: Arc<dyn InventoryStore> = Arc::new(FileInventoryStore::new(
        Config::resolve_path(&config.inventory.path),
    ));

    if cli.check_config {
        inventory.snapshot().await?;
        println!("configuration and inventory are valid");
        return Ok(());
    }

    let logger = Arc::new(EventLogger::from_config(&config.logging));

    if cli.status {
        let snapshot = inventory.snapshot().await?;
        for node in snapshot.nodes.values() {
            println!("{}: {}", node.name, node.ip);
        }
        return Ok(());
    }

    let persistence = Arc::new(PersistenceFacade::new(&config.persistence, Arc::clone(&logger)));

    let notifier: Arc<dyn netsentry::notifications::NotificationSink> = if config.pushover.enabled {
        Arc::new(PushoverClient::from_env(
            &config.pushover.token_env,
            &config.pushover.user_key_env,
        ))
    } else {
        Arc::new(PushoverClient::new())
    };

    let alert_state_path = Config::resolve_path(&config.persistence.fallback_file)
        .parent()
        .map(|p| p.join("alert_states.json"))
        .unwrap_or_else(|| std::path::PathBuf::from("alert_states.json"));
    let metrics = Arc::new(MetricProcessor::new(
        AlertStateStore::new(alert_state_path),
        Arc::clone(&notifier),
        Arc::clone(&logger),
    ));

    let icmp_driver = Arc::new(RealIcmpDriver);
    let snmp_driver = Arc::new(RealSnmpDriver);

    let manager = Arc::new(MonitorManager::new(
        config,
        inventory,
        icmp_driver,
        snmp_driver,
        persistence,
        metrics,
        notifier,
        logger,
    ));

    manager.run().await;
    Ok(())
}
