mod dashboard;
mod departments;
mod employees;
mod problem;
mod router;
mod telemetry;

use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::info;

use staffdesk_storage::{import_legacy, Database, ImageStore, LegacyDatabase};
use staffdesk_util::{load_env_file, AppConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    let metrics = telemetry::init_metrics()?;

    let database = Database::connect(&config.database_url).await?;
    database.run_migrations().await?;
    let images = ImageStore::new(config.media_root.clone());

    let mut args = std::env::args().skip(1);
    if let Some(command) = args.next() {
        if command == "import-legacy" {
            let Some(legacy_url) = args.next() else {
                return Err("usage: staffdesk-app import-legacy <legacy-db-url> [media-dir]".into());
            };
            let legacy_media = args.next().map(PathBuf::from);
            let legacy = LegacyDatabase::connect(&legacy_url).await?;
            let report = import_legacy(&legacy, &database, &images, legacy_media.as_deref()).await?;
            info!(
                stage = "import",
                departments = report.departments_copied,
                employees = report.employees_copied,
                skipped = report.departments_skipped + report.employees_skipped,
                "legacy import complete"
            );
            return Ok(());
        }
        return Err(format!("unknown command: {command}").into());
    }

    let state = router::AppState::new(metrics, database, images, config.employee_delete);

    let addr: SocketAddr = config.bind_addr;
    info!(stage = "app", %addr, env = %config.environment.as_str(), "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router::app_router(state))
        .await
        .map_err(|err| err.into())
}
