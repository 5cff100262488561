// src/error.rs
use std::fmt;

use chrono::Duration;
use uuid::Uuid;

#[derive(Debug)]
pub enum WalletError {
    InvalidAmount,
    InvalidRequest(String),
    InsufficientBalance,
    CooldownActive { retry_after: Duration },
    AccountNotFound(Uuid),
    EntryNotFound,
    Conflict(String),
    Storage(String),
}

impl fmt::Display for WalletError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidAmount => write!(f, "Invalid amount"),
            Self::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            Self::InsufficientBalance => write!(f, "Insufficient balance"),
            Self::CooldownActive { retry_after } => {
                write!(f, "Cooldown active, retry in {}s", retry_after.num_seconds())
            }
            Self::AccountNotFound(id) => write!(f, "Account not found: {}", id),
            Self::EntryNotFound => write!(f, "Ledger entry not found"),
            Self::Conflict(msg) => write!(f, "Conflict: {}", msg),
            Self::Storage(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl std::error::Error for WalletError {}
