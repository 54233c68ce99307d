use serde::{Deserialize, Serialize};

/// Payment state of a commission, per party and overall. Unknown values
/// parse to `Pending` so they can never lift masking by accident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Partial,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Partial => "partial",
            Self::Paid => "paid",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "paid" => Self::Paid,
            "partial" => Self::Partial,
            _ => Self::Pending,
        }
    }

    pub fn is_paid(self) -> bool {
        self == Self::Paid
    }
}
