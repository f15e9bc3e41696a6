//! Profile server entry point: loads configuration, wires every component
//! through the [`lifecycle::Supervisor`] in dependency order, and runs
//! until interrupted.

use profile_server::config::Settings;
use profile_server::cron::Cron;
use profile_server::external::can::CanClient;
use profile_server::identity;
use profile_server::images::ImageManager;
use profile_server::lifecycle::Supervisor;
use profile_server::neighborhood::NeighborhoodProcessor;
use profile_server::net::RoleFabric;
use profile_server::session::SessionContext;
use profile_server::store::Store;
use profile_server::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).with_level(true).init();

    let config_path = std::env::args().nth(1).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("profile-server.toml"));
    let settings = Arc::new(Settings::load(&config_path)?);
    info!(config = %config_path.display(), "loaded configuration");

    std::fs::create_dir_all(&settings.data_dir)?;
    std::fs::create_dir_all(settings.data_dir.join(&settings.image_data_folder))?;
    std::fs::create_dir_all(settings.data_dir.join(&settings.tmp_data_folder))?;

    let store = Arc::new(Store::open(&settings.data_dir.join("profile_server.sqlite3"))?);
    let identity = Arc::new(identity::load_or_create(&store, &settings)?);
    info!(network_id = %identity.network_id, "server identity loaded");

    let images = Arc::new(ImageManager::new(settings.data_dir.join(&settings.image_data_folder)));
    images.reconcile(store.all_image_references().await?)?;

    if identity.contact_information_changed {
        let can = CanClient::new(&settings);
        if let Err(e) = can.publish_contact(identity.network_id, &settings.external_server_address, settings.primary_interface_port).await {
            error!(error = %e, "failed to publish contact record to CAN; will retry on next identity load");
        }
    }

    let ctx = Arc::new(SessionContext::new(settings.clone(), store.clone(), images.clone(), identity.clone()));

    let mut supervisor = Supervisor::new();
    supervisor.start(Arc::new(RoleFabric::new(ctx.clone(), Some(settings.tls_server_certificate.clone()))?)).await?;
    supervisor.start(Arc::new(NeighborhoodProcessor::new(settings.clone(), store.clone(), images.clone(), identity.clone()))).await?;
    supervisor.start(Arc::new(Cron::new(settings.clone(), store.clone(), images.clone(), identity.clone()))).await?;

    info!("profile server running");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    supervisor.shutdown_all().await;
    info!("profile server stopped");
    Ok(())
}
