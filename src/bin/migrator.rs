use dotenvy::dotenv;
use leave_approvals::{
    infrastructure::{config::Config, db},
    telemetry,
};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    telemetry::init();

    let config = Config::from_env()?;
    if !config.uses_postgres() {
        anyhow::bail!(
            "store.provider is `{}`; migrations only apply to postgres",
            config.store.provider
        );
    }
    let pool = db::connect(&config.database).await?;
    db::run_migrations(&pool).await?;

    info!("approval engine migrations completed");

    Ok(())
}
