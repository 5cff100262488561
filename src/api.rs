// src/api.rs
use crate::config::Config;
use crate::referral::{CreditOutcome, NotCreditedReason};
use crate::WalletSystem;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use uuid::Uuid;

#[derive(Deserialize)]
pub struct CreditReferralRequest {
    pub new_account_id: Option<Uuid>,
    pub referral_code: Option<String>,
    #[serde(default)]
    pub new_account_contact: Option<String>,
}

#[derive(Serialize)]
pub struct CreditReferralResponse {
    pub credited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referral_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer_balance: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<Uuid>,
}

impl CreditReferralResponse {
    fn denied(reason: &'static str) -> Self {
        Self {
            credited: false,
            reason: Some(reason),
            message: None,
            referrer_id: None,
            referral_count: None,
            referrer_balance: None,
            transaction_id: None,
        }
    }

    fn denied_with_message(reason: &'static str, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::denied(reason)
        }
    }
}

pub fn router(system: Arc<WalletSystem>) -> Router {
    Router::new()
        .route("/", get(|| async { "wallet-ledger API running" }))
        .route("/credit-referral", post(credit_referral))
        .with_state(system)
}

pub async fn serve(cfg: &Config, system: Arc<WalletSystem>) -> eyre::Result<()> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router(system).layer(cors);

    let addr = SocketAddr::from(([127, 0, 0, 1], cfg.port));
    info!("wallet API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

async fn credit_referral(
    State(system): State<Arc<WalletSystem>>,
    Json(req): Json<CreditReferralRequest>,
) -> (StatusCode, Json<CreditReferralResponse>) {
    let code = req.referral_code.filter(|c| !c.is_empty());
    let (Some(new_account_id), Some(referral_code)) = (req.new_account_id, code) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(CreditReferralResponse::denied_with_message(
                "missing_parameters",
                "new_account_id and referral_code are required",
            )),
        );
    };

    match system
        .credit_referral(new_account_id, &referral_code, req.new_account_contact)
        .await
    {
        Ok(CreditOutcome::Credited {
            referrer_id,
            referral_count,
            referrer_balance,
            entry_id,
        }) => (
            StatusCode::OK,
            Json(CreditReferralResponse {
                credited: true,
                reason: None,
                message: None,
                referrer_id: Some(referrer_id),
                referral_count: Some(referral_count),
                referrer_balance: Some(referrer_balance),
                transaction_id: Some(entry_id),
            }),
        ),
        Ok(CreditOutcome::NotCredited(reason)) => {
            let status = match reason {
                NotCreditedReason::InvalidCode | NotCreditedReason::AlreadyCredited => {
                    StatusCode::OK
                }
                NotCreditedReason::UserNotFound => StatusCode::NOT_FOUND,
                NotCreditedReason::TransactionFailed
                | NotCreditedReason::ReferrerUpdateFailed { .. } => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            let mut response = CreditReferralResponse::denied(reason.as_str());
            if let NotCreditedReason::ReferrerUpdateFailed { entry_id } = reason {
                // Reconciliation reference for the operator.
                response.transaction_id = Some(entry_id);
            }
            (status, Json(response))
        }
        Err(err) => {
            error!(%err, "credit-referral failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(CreditReferralResponse::denied_with_message(
                    "server_error",
                    err.to_string(),
                )),
            )
        }
    }
}
