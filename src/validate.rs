// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Cache-vs-truth validation. The validator recomputes the aggregates
//! read-only (same scan the recalculator uses) and is the authority on
//! whether a customer's cached fields may be trusted.

use crate::alerts::{Alert, AlertSink, Severity};
use crate::error::Result;
use crate::models::{Customer, CustomerScope, MONEY_EPS, money_eq, pending_balance};
use crate::recalc;
use crate::store;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct FieldCheck {
    pub field: &'static str,
    pub stored: Decimal,
    pub actual: Decimal,
}

impl FieldCheck {
    pub fn is_valid(&self) -> bool {
        money_eq(self.stored, self.actual)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub customer_id: i64,
    pub tenant_id: i64,
    pub is_valid: bool,
    pub checks: Vec<FieldCheck>,
    /// Absolute gap between stored and recomputed pending balance.
    pub difference: Decimal,
}

#[derive(Debug)]
pub enum ValidationOutcome {
    CustomerNotFound,
    Report(ValidationReport),
}

/// Result of a bulk scan; per-customer corruption is counted in `failed`
/// rather than aborting the remaining customers.
#[derive(Debug, Default, Serialize)]
pub struct MismatchScan {
    pub scanned: usize,
    pub failed: usize,
    pub mismatches: Vec<ValidationReport>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditDecision {
    Approved,
    Rejected,
    CustomerNotFound,
}

impl CreditDecision {
    pub fn approved(&self) -> bool {
        matches!(self, CreditDecision::Approved)
    }
}

fn build_report(
    customer: &Customer,
    actual_sales: Decimal,
    actual_payments: Decimal,
    actual_returns: Decimal,
) -> ValidationReport {
    let actual_pending = pending_balance(actual_sales, actual_payments, actual_returns);
    let checks = vec![
        FieldCheck {
            field: "total_sales",
            stored: customer.total_sales,
            actual: actual_sales,
        },
        FieldCheck {
            field: "total_payments",
            stored: customer.total_payments,
            actual: actual_payments,
        },
        FieldCheck {
            field: "pending_balance",
            stored: customer.pending_balance,
            actual: actual_pending,
        },
    ];
    ValidationReport {
        customer_id: customer.id,
        tenant_id: customer.tenant_id,
        is_valid: checks.iter().all(FieldCheck::is_valid),
        difference: (actual_pending - customer.pending_balance).abs(),
        checks,
    }
}

fn alert_mismatches(report: &ValidationReport, sink: &dyn AlertSink) {
    for check in report.checks.iter().filter(|c| !c.is_valid()) {
        sink.notify(Alert {
            kind: "balance_mismatch".into(),
            title: "Cached balance out of sync".into(),
            message: format!(
                "customer {}: {} stored {} but actual {}",
                report.customer_id, check.field, check.stored, check.actual
            ),
            severity: Severity::Critical,
            metadata: json!({
                "customer_id": report.customer_id,
                "field": check.field,
                "stored": check.stored,
                "actual": check.actual,
            }),
            tenant_id: report.tenant_id,
        });
    }
}

/// Compare one customer's cached fields to freshly recomputed truth. Never
/// writes. Mismatches beyond the money tolerance mark the report invalid and
/// emit a critical alert per field.
pub fn validate(
    conn: &Connection,
    tenant_id: i64,
    customer_id: i64,
    sink: &dyn AlertSink,
) -> Result<ValidationOutcome> {
    let Some(customer) = store::get_customer(conn, tenant_id, customer_id)? else {
        warn!(customer_id, tenant_id, "validate: customer not found");
        return Ok(ValidationOutcome::CustomerNotFound);
    };
    let totals = recalc::compute_totals(
        conn,
        customer.tenant_id,
        CustomerScope::Customer(customer.id),
    )?;
    let report = build_report(
        &customer,
        totals.total_sales,
        totals.total_payments,
        totals.total_returns,
    );
    if !report.is_valid {
        alert_mismatches(&report, sink);
    }
    Ok(ValidationOutcome::Report(report))
}

/// Scan every customer of a tenant (or every tenant via the sentinel) for
/// cache drift. One pass per stream, grouped per customer in Rust; corrupt
/// rows sideline their customer without stopping the scan.
pub fn detect_mismatches(
    conn: &Connection,
    tenant_id: i64,
    sink: &dyn AlertSink,
) -> Result<MismatchScan> {
    let customers = store::list_customers(conn, tenant_id)?;
    let sales = store::sales_by_customer(conn, tenant_id)?;
    let payments = store::payments_by_customer(conn, tenant_id)?;
    let returns = store::returns_by_customer(conn, tenant_id)?;

    let mut scan = MismatchScan::default();
    for customer in &customers {
        scan.scanned += 1;
        let corrupt = sales.corrupt.contains(&customer.id)
            || payments.corrupt.contains(&customer.id)
            || returns.corrupt.contains(&customer.id);
        if corrupt {
            warn!(customer_id = customer.id, "detect_mismatches: skipping corrupt customer");
            scan.failed += 1;
            continue;
        }
        let report = build_report(
            customer,
            sales.total_for(customer.id),
            payments.total_for(customer.id),
            returns.total_for(customer.id),
        );
        if !report.is_valid {
            alert_mismatches(&report, sink);
            scan.mismatches.push(report);
        }
    }
    Ok(scan)
}

/// Repair a drifted cache: recalculate from scratch, then re-validate.
/// Returns whether the customer is now valid.
pub fn fix_mismatch(
    conn: &mut Connection,
    tenant_id: i64,
    customer_id: i64,
    sink: &dyn AlertSink,
) -> Result<bool> {
    recalc::recalculate(conn, tenant_id, customer_id)?;
    match validate(conn, tenant_id, customer_id, sink)? {
        ValidationOutcome::Report(report) if report.is_valid => {
            info!(customer_id, "mismatch repaired");
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Would extending `additional` credit keep the customer within their
/// limit? Rejections emit a warning alert carrying the attempted amount.
pub fn can_extend_credit(
    conn: &Connection,
    tenant_id: i64,
    customer_id: i64,
    additional: Decimal,
    sink: &dyn AlertSink,
) -> Result<CreditDecision> {
    let Some(customer) = store::get_customer(conn, tenant_id, customer_id)? else {
        warn!(customer_id, tenant_id, "can_extend_credit: customer not found");
        return Ok(CreditDecision::CustomerNotFound);
    };
    if customer.pending_balance + additional <= customer.credit_limit + *MONEY_EPS {
        return Ok(CreditDecision::Approved);
    }
    sink.notify(Alert {
        kind: "credit_limit".into(),
        title: "Credit limit exceeded".into(),
        message: format!(
            "customer {}: extending {} would take balance {} past limit {}",
            customer.id, additional, customer.pending_balance, customer.credit_limit
        ),
        severity: Severity::Warning,
        metadata: json!({
            "customer_id": customer.id,
            "attempted": additional,
            "pending_balance": customer.pending_balance,
            "credit_limit": customer.credit_limit,
        }),
        tenant_id: customer.tenant_id,
    });
    Ok(CreditDecision::Rejected)
}
