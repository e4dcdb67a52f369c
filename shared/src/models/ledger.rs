//! Token Ledger Model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::account::AccountId;

/// `token_transactions.transaction_type` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Purchase,
    Bonus,
    Refund,
    Adjustment,
    Generation,
    InitialGrant,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::Bonus => "bonus",
            Self::Refund => "refund",
            Self::Adjustment => "adjustment",
            Self::Generation => "generation",
            Self::InitialGrant => "initial_grant",
        }
    }
}

/// Why tokens are credited to an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CreditReason {
    Purchase {
        payment_ref: String,
        package: Option<String>,
    },
    Bonus {
        note: Option<String>,
    },
    Refund {
        note: Option<String>,
    },
    Adjustment {
        note: Option<String>,
    },
}

impl CreditReason {
    pub fn transaction_type(&self) -> TransactionType {
        match self {
            Self::Purchase { .. } => TransactionType::Purchase,
            Self::Bonus { .. } => TransactionType::Bonus,
            Self::Refund { .. } => TransactionType::Refund,
            Self::Adjustment { .. } => TransactionType::Adjustment,
        }
    }

    pub fn description(&self, amount: i64) -> String {
        match self {
            Self::Purchase { package: Some(p), .. } => {
                format!("Purchased {} tokens ({})", amount, p)
            }
            Self::Purchase { package: None, .. } => format!("Purchased {} tokens", amount),
            Self::Bonus { note } | Self::Refund { note } | Self::Adjustment { note } => note
                .clone()
                .unwrap_or_else(|| format!("{} of {} tokens", self.transaction_type().as_str(), amount)),
        }
    }

    pub fn metadata(&self) -> Value {
        match self {
            Self::Purchase {
                payment_ref,
                package,
            } => json!({ "payment_ref": payment_ref, "package": package }),
            _ => json!({}),
        }
    }
}

/// Append-only ledger row (`token_transactions`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct LedgerTransaction {
    pub id: i64,
    pub user_id: AccountId,
    /// Signed: charges are negative
    pub amount: i64,
    pub transaction_type: String,
    pub description: Option<String>,
    pub balance_after: i64,
    /// Relational event id the tokens were spent on
    pub event_id: Option<i64>,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// Result of a charge or credit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeReceipt {
    pub account_id: AccountId,
    /// Tokens moved; positive for both charges and credits
    pub charged: i64,
    pub new_balance: i64,
    pub transaction_id: i64,
}

/// Aggregates over an account's ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LedgerStats {
    pub balance: i64,
    pub total_purchased: i64,
    pub total_spent: i64,
    pub generation_count: i64,
}
