// src/config.rs
use crate::WalletConfig;
use chrono::Duration;
use dotenvy::dotenv;
use eyre::Result;
use std::env;
use tracing::info;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub wallet: WalletConfig,
}

pub fn load() -> Result<Config> {
    dotenv().ok();

    let database_url =
        env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/wallet".to_string());

    let port = env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .unwrap_or(8080);

    let defaults = WalletConfig::default();
    let wallet = WalletConfig {
        claim_amount: env_i64("CLAIM_AMOUNT", defaults.claim_amount),
        claim_interval: Duration::seconds(env_i64(
            "CLAIM_INTERVAL_SECS",
            defaults.claim_interval.num_seconds(),
        )),
        referral_bonus: env_i64("REFERRAL_BONUS", defaults.referral_bonus),
        opening_balance: env_i64("OPENING_BALANCE", defaults.opening_balance),
        rollback_cooldown_on_failure: env::var("COOLDOWN_ROLLBACK")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(defaults.rollback_cooldown_on_failure),
    };

    let cfg = Config {
        database_url,
        port,
        wallet,
    };

    info!(
        "Loaded config: port={} claim_amount={} claim_interval={}s referral_bonus={} opening_balance={} cooldown_rollback={}",
        cfg.port,
        cfg.wallet.claim_amount,
        cfg.wallet.claim_interval.num_seconds(),
        cfg.wallet.referral_bonus,
        cfg.wallet.opening_balance,
        cfg.wallet.rollback_cooldown_on_failure,
    );

    Ok(cfg)
}

fn env_i64(key: &str, default: i64) -> i64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
