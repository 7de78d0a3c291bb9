use std::sync::Arc;

use kexo_core::config::{Config, ServiceProfile};

#[tokio::main]
async fn main() -> Result<(), kexo_core::Error> {
    let profile = ServiceProfile::polling();
    kexo_core::logging::init(profile.service_name)?;

    let cfg = Arc::new(Config::load(profile).inspect_err(|e| {
        tracing::error!(error = %e, "failed to load configuration");
    })?);

    kexo_telegram::router::run_polling(cfg)
        .await
        .map_err(|e| kexo_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
