//! Shared primitive types used across the entire pipeline.

use serde::{Deserialize, Serialize};

/// A stable, unique identifier for a signed-up user.
pub type UserId = i64;

/// Outcome of a KYC attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KycStatus {
    Approved,
    Failed,
    Pending,
}

impl KycStatus {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "APPROVED" => Some(Self::Approved),
            "FAILED"   => Some(Self::Failed),
            "PENDING"  => Some(Self::Pending),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "APPROVED",
            Self::Failed   => "FAILED",
            Self::Pending  => "PENDING",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    CardPayment,
    AtmWithdrawal,
    Transfer,
}

impl TransactionType {
    pub const ALL: [TransactionType; 3] = [
        Self::CardPayment,
        Self::AtmWithdrawal,
        Self::Transfer,
    ];

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "CARD_PAYMENT"   => Some(Self::CardPayment),
            "ATM_WITHDRAWAL" => Some(Self::AtmWithdrawal),
            "TRANSFER"       => Some(Self::Transfer),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CardPayment   => "CARD_PAYMENT",
            Self::AtmWithdrawal => "ATM_WITHDRAWAL",
            Self::Transfer      => "TRANSFER",
        }
    }
}

/// The five onboarding milestones, in canonical order.
/// NEVER reorder: the discriminant is the published `step_order`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum FunnelStep {
    ViewedSignup        = 1,
    StartedRegistration = 2,
    KycCompleted        = 3,
    CardActivated       = 4,
    FirstTopup          = 5,
}

impl FunnelStep {
    pub const ALL: [FunnelStep; 5] = [
        Self::ViewedSignup,
        Self::StartedRegistration,
        Self::KycCompleted,
        Self::CardActivated,
        Self::FirstTopup,
    ];

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "VIEWED_SIGNUP"        => Some(Self::ViewedSignup),
            "STARTED_REGISTRATION" => Some(Self::StartedRegistration),
            "KYC_COMPLETED"        => Some(Self::KycCompleted),
            "CARD_ACTIVATED"       => Some(Self::CardActivated),
            "FIRST_TOPUP"          => Some(Self::FirstTopup),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ViewedSignup        => "VIEWED_SIGNUP",
            Self::StartedRegistration => "STARTED_REGISTRATION",
            Self::KycCompleted        => "KYC_COMPLETED",
            Self::CardActivated       => "CARD_ACTIVATED",
            Self::FirstTopup          => "FIRST_TOPUP",
        }
    }

    /// The 1-based position of this step in the funnel.
    pub fn order(&self) -> u8 {
        *self as u8
    }
}
