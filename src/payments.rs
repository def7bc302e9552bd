use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::coordinator::{Handler, HandlerOutcome, HandlerRequest};
use crate::error::{AppError, Result};

/// A payment submission, as deserialized from the request payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub amount: Decimal,
    pub currency: String,
    pub reference: Option<String>,
}

impl PaymentRequest {
    pub fn validate(&self) -> Result<()> {
        if self.amount <= Decimal::ZERO {
            return Err(AppError::Validation("amount must be positive".to_string()));
        }
        if self.currency.len() != 3 {
            return Err(AppError::Validation(
                "currency must be a 3-letter ISO 4217 code".to_string(),
            ));
        }
        Ok(())
    }
}

/// Stub payment processor standing in for the real side-effecting handler.
///
/// Each approval fabricates a fresh order id, so replaying a cached outcome
/// is observably different from re-executing. Amounts above the decline
/// threshold fail, exercising the never-cache-failures path.
pub struct PaymentProcessor {
    decline_threshold: Decimal,
}

impl PaymentProcessor {
    pub fn new() -> Self {
        Self {
            decline_threshold: Decimal::from(10_000),
        }
    }

    pub fn with_decline_threshold(decline_threshold: Decimal) -> Self {
        Self { decline_threshold }
    }
}

impl Default for PaymentProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for PaymentProcessor {
    async fn execute(&self, request: HandlerRequest) -> Result<HandlerOutcome> {
        let payload = request
            .payload
            .ok_or_else(|| AppError::Validation("payment request body is required".to_string()))?;

        let payment: PaymentRequest = serde_json::from_value(payload)
            .map_err(|e| AppError::Validation(format!("invalid payment request: {}", e)))?;
        payment.validate()?;

        if payment.amount > self.decline_threshold {
            return Err(AppError::Handler(anyhow::anyhow!(
                "payment of {} {} declined by issuer",
                payment.amount,
                payment.currency
            )));
        }

        let body = json!({
            "order_id": Uuid::new_v4(),
            "amount": payment.amount,
            "currency": payment.currency,
            "reference": payment.reference,
            "status": "approved",
            "processed_at": Utc::now(),
        });

        Ok(HandlerOutcome::Cacheable {
            status_code: 200,
            body,
        })
    }
}
