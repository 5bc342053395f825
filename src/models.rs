use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Records
// ============================================================================
//
// One struct per table, mapped with sqlx::FromRow. Identities are the
// SQLite rowids. `New*` structs are the insert payloads; their `validate`
// enforces the column length limits before anything reaches the store.
//
// ============================================================================

pub type RecordId = i64;

pub const NAME_MAX_LEN: usize = 120;
pub const ADDRESS_MAX_LEN: usize = 220;
pub const LABEL_MAX_LEN: usize = 50;
pub const USERNAME_MAX_LEN: usize = 150;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    pub id: RecordId,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Supplier {
    pub id: RecordId,
    pub account_id: RecordId,
    pub name: String,
    pub address: String,
    pub created_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Buyer {
    pub id: RecordId,
    pub account_id: RecordId,
    pub name: String,
    pub address: String,
    pub created_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: RecordId,
    pub name: String,
    pub sort_order: u32,
    pub created_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub id: RecordId,
    pub supplier_id: RecordId,
    pub product_id: RecordId,
    pub design: String,
    pub color: String,
    pub buyer_id: Option<RecordId>,
    pub status: OrderStatus,
    pub created_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Delivery {
    pub id: RecordId,
    pub order_id: RecordId,
    pub courier_name: String,
    pub created_date: NaiveDate,
}

/// Order lifecycle label. Any status may follow any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Decline,
    Approved,
    Processing,
    Complete,
    Delivered,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Decline,
        OrderStatus::Approved,
        OrderStatus::Processing,
        OrderStatus::Complete,
        OrderStatus::Delivered,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Decline => "decline",
            OrderStatus::Approved => "approved",
            OrderStatus::Processing => "processing",
            OrderStatus::Complete => "complete",
            OrderStatus::Delivered => "delivered",
        }
    }

    /// Human label, as shown to operators
    pub fn label(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Decline => "Decline",
            OrderStatus::Approved => "Approved",
            OrderStatus::Processing => "Processing",
            OrderStatus::Complete => "Complete",
            OrderStatus::Delivered => "Delivered",
        }
    }

    /// Whether creating an order in this status sends a print job.
    /// Only checked on insert; status updates never print.
    pub fn prints_on_create(&self) -> bool {
        matches!(self, OrderStatus::Approved)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown order status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

// ============================================================================
// Insert payloads
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct NewAccount {
    pub username: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSupplier {
    pub account_id: RecordId,
    pub name: String,
    pub address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewBuyer {
    pub account_id: RecordId,
    pub name: String,
    pub address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub sort_order: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewOrder {
    pub supplier_id: RecordId,
    pub product_id: RecordId,
    pub design: String,
    pub color: String,
    #[serde(default)]
    pub buyer_id: Option<RecordId>,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewDelivery {
    pub order_id: RecordId,
    pub courier_name: String,
}

/// Field-level validation failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    #[error("{field} is longer than {max} characters")]
    TooLong { field: &'static str, max: usize },
}

fn check_text(field: &'static str, value: &str, max: usize, required: bool) -> Result<(), FieldError> {
    if required && value.trim().is_empty() {
        return Err(FieldError::Empty { field });
    }
    if value.chars().count() > max {
        return Err(FieldError::TooLong { field, max });
    }
    Ok(())
}

impl NewAccount {
    pub fn validate(&self) -> Result<(), FieldError> {
        check_text("username", &self.username, USERNAME_MAX_LEN, true)
    }
}

impl NewSupplier {
    pub fn validate(&self) -> Result<(), FieldError> {
        check_text("name", &self.name, NAME_MAX_LEN, true)?;
        check_text("address", &self.address, ADDRESS_MAX_LEN, false)
    }
}

impl NewBuyer {
    pub fn validate(&self) -> Result<(), FieldError> {
        check_text("name", &self.name, NAME_MAX_LEN, true)?;
        check_text("address", &self.address, ADDRESS_MAX_LEN, false)
    }
}

impl NewProduct {
    pub fn validate(&self) -> Result<(), FieldError> {
        check_text("name", &self.name, NAME_MAX_LEN, true)
    }
}

impl NewOrder {
    pub fn validate(&self) -> Result<(), FieldError> {
        check_text("design", &self.design, LABEL_MAX_LEN, false)?;
        check_text("color", &self.color, LABEL_MAX_LEN, false)
    }
}

impl NewDelivery {
    pub fn validate(&self) -> Result<(), FieldError> {
        check_text("courier_name", &self.courier_name, NAME_MAX_LEN, true)
    }
}
