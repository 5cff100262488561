use std::sync::Arc;

use tracing::info;
use wallet_ledger::adapters::postgres::{PostgresSchemaWalletAdapter, PostgresWallet};
use wallet_ledger::{WalletSystem, api, config};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    info!("wallet-ledger starting...");

    let cfg = config::load()?;

    let store = PostgresWallet::connect(&cfg.database_url).await?;
    store.init_wallet_schema().await?;
    info!("wallet schema ready");

    let system = Arc::new(WalletSystem::new(Box::new(store), cfg.wallet.clone()));

    api::serve(&cfg, system).await
}
