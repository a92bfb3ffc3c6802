// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Tenant id sentinel: queries scoped to tenant `0` span every tenant
/// (platform-administrator view). Deliberately explicit, not an `Option`.
pub const ALL_TENANTS: i64 = 0;

/// Single tolerance for every monetary equality/threshold comparison.
pub static MONEY_EPS: Lazy<Decimal> = Lazy::new(|| Decimal::new(1, 2));

pub fn money_eq(a: Decimal, b: Decimal) -> bool {
    (a - b).abs() <= *MONEY_EPS
}

/// Canonical balance formula. Both the incremental and the from-scratch
/// recalculation paths must go through here.
pub fn pending_balance(
    total_sales: Decimal,
    total_payments: Decimal,
    total_returns: Decimal,
) -> Decimal {
    total_sales - total_payments - total_returns
}

/// Whose transactions a query targets: a tracked customer, or the walk-in
/// "cash customer" sentinel (`customer_id IS NULL` on the row).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomerScope {
    Customer(i64),
    Cash,
}

/// Derived payment state of an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Partial,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Partial => "partial",
            PaymentStatus::Paid => "paid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "partial" => Some(PaymentStatus::Partial),
            "paid" => Some(PaymentStatus::Paid),
            _ => None,
        }
    }

    /// Status implied by a paid-to-date amount against the invoice total,
    /// using the standard money tolerance on both thresholds.
    pub fn for_paid(paid: Decimal, grand_total: Decimal) -> Self {
        if paid >= grand_total - *MONEY_EPS {
            PaymentStatus::Paid
        } else if paid > *MONEY_EPS {
            PaymentStatus::Partial
        } else {
            PaymentStatus::Pending
        }
    }
}

/// Settlement state of a payment. `Void` payments are excluded from every
/// aggregate; `Pending` ones count (see DESIGN.md for the canonical rule).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentState {
    Pending,
    Cleared,
    Void,
}

impl PaymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentState::Pending => "pending",
            PaymentState::Cleared => "cleared",
            PaymentState::Void => "void",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentState::Pending),
            "cleared" => Some(PaymentState::Cleared),
            "void" => Some(PaymentState::Void),
            _ => None,
        }
    }

    pub fn counts(&self) -> bool {
        !matches!(self, PaymentState::Void)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMode {
    Cash,
    Cheque,
    Online,
    Credit,
}

impl PaymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMode::Cash => "cash",
            PaymentMode::Cheque => "cheque",
            PaymentMode::Online => "online",
            PaymentMode::Credit => "credit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cash" => Some(PaymentMode::Cash),
            "cheque" => Some(PaymentMode::Cheque),
            "online" => Some(PaymentMode::Online),
            "credit" => Some(PaymentMode::Credit),
            _ => None,
        }
    }
}

/// Customer row with its cached aggregate fields. The cache is written only
/// by `recalc`; presentation code never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    pub tenant_id: i64,
    pub name: String,
    pub total_sales: Decimal,
    pub total_payments: Decimal,
    pub total_returns: Decimal,
    pub pending_balance: Decimal,
    pub credit_limit: Decimal,
    pub last_payment_date: Option<NaiveDate>,
    pub last_activity: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: i64,
    pub tenant_id: i64,
    pub customer_id: Option<i64>,
    pub invoice_no: String,
    pub grand_total: Decimal,
    pub paid_amount: Decimal,
    pub payment_status: PaymentStatus,
    pub invoice_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub branch_id: Option<i64>,
    pub route_id: Option<i64>,
    pub created_by: Option<i64>,
    pub is_deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub tenant_id: i64,
    pub customer_id: Option<i64>,
    pub sale_id: Option<i64>,
    pub amount: Decimal,
    pub status: PaymentState,
    pub mode: PaymentMode,
    pub payment_date: NaiveDate,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnNote {
    pub id: i64,
    pub tenant_id: i64,
    pub customer_id: Option<i64>,
    pub return_no: String,
    pub grand_total: Decimal,
    pub return_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerKind {
    Invoice,
    Payment,
    Return,
}

/// One row of the reconciled timeline. Built fresh on every read, never
/// persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub date: NaiveDate,
    pub kind: LedgerKind,
    pub reference: String,
    pub debit: Decimal,
    pub credit: Decimal,
    pub running_balance: Decimal,
    pub sale_id: Option<i64>,
    pub payment_id: Option<i64>,
    pub status: String,
}
