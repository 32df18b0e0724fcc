use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use quickledger::config::Config;
use quickledger::middleware::auth_redirect::LogNavigator;
use quickledger::storage::FileStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(&config.log_level)
        }))
        .init();

    tracing::info!("Starting QuickLedger client against {}", config.api_url);

    let storage = Arc::new(FileStore::open(&config.storage_path).await?);
    tracing::debug!("Using storage at {}", storage.path().display());

    let app = quickledger::build_app(config, storage, Arc::new(LogNavigator))?;

    // Restore first, then load companies against the validated session.
    let Some(user) = app.auth.restore().await? else {
        tracing::info!("No stored session, sign-in required");
        return Ok(());
    };
    tracing::info!("Signed in as {}", user.display_name());

    app.companies.sync_with_auth(&app.session.snapshot()).await;
    if let Some(error) = app.companies.error() {
        tracing::warn!("Company list may be stale: {error}");
    }

    let current = app.companies.current_company_id();
    for company in app.companies.companies() {
        let marker = if current.as_deref() == Some(company.id.as_str()) { "*" } else { " " };
        tracing::info!("{marker} {} ({})", company.name, company.id);
    }

    Ok(())
}
