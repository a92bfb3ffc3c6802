// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Cached-aggregate maintenance: the from-scratch recalculation path and the
//! incremental delta path. Both compute `pending_balance` through
//! [`models::pending_balance`] and both run their read-modify-write cycle
//! inside an IMMEDIATE transaction, so writes to a customer row are
//! serialized by the database write lock and the two paths cannot race each
//! other.

use crate::error::Result;
use crate::models::{self, CustomerScope, money_eq};
use crate::store::{self, CustomerCache, InvoiceFilter};
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, TransactionBehavior};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, warn};

/// Truth recomputed from the three transaction streams.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateTotals {
    pub total_sales: Decimal,
    pub total_payments: Decimal,
    pub total_returns: Decimal,
    pub pending_balance: Decimal,
    pub last_payment_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecalcOutcome {
    Updated,
    Unchanged,
    CustomerNotFound,
}

/// Outcome of a bulk pass. One customer's failure never aborts the rest;
/// it is logged and counted here instead.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BulkOutcome {
    pub changed: usize,
    pub unchanged: usize,
    pub failed: usize,
}

/// Read-only scan of the three stores for one scope. Shared by the
/// recalculator and the balance validator so cache and truth cannot drift by
/// construction.
pub fn compute_totals(
    conn: &Connection,
    tenant_id: i64,
    scope: CustomerScope,
) -> Result<AggregateTotals> {
    let invoices = store::fetch_invoices(conn, tenant_id, scope, &InvoiceFilter::default())?;
    let payments = store::fetch_payments(conn, tenant_id, scope)?;
    let returns = store::fetch_returns(conn, tenant_id, scope, None, None)?;

    let total_sales: Decimal = invoices.iter().map(|i| i.grand_total).sum();
    let total_payments: Decimal = payments
        .iter()
        .filter(|p| p.status.counts())
        .map(|p| p.amount)
        .sum();
    let total_returns: Decimal = returns.iter().map(|r| r.grand_total).sum();
    // last payment date considers every payment row, not only cleared ones
    let last_payment_date = payments.iter().map(|p| p.payment_date).max();

    Ok(AggregateTotals {
        total_sales,
        total_payments,
        total_returns,
        pending_balance: models::pending_balance(total_sales, total_payments, total_returns),
        last_payment_date,
    })
}

/// Recompute one customer's cached aggregates from scratch. Idempotent; all
/// reads and the single cache write happen in one transaction. A missing
/// customer is a logged no-op, not an error.
pub fn recalculate(
    conn: &mut Connection,
    tenant_id: i64,
    customer_id: i64,
) -> Result<RecalcOutcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let outcome = recalculate_in(&tx, tenant_id, customer_id)?;
    tx.commit()?;
    Ok(outcome)
}

fn recalculate_in(conn: &Connection, tenant_id: i64, customer_id: i64) -> Result<RecalcOutcome> {
    let Some(customer) = store::get_customer(conn, tenant_id, customer_id)? else {
        warn!(customer_id, tenant_id, "recalculate: customer not found, skipping");
        return Ok(RecalcOutcome::CustomerNotFound);
    };
    // scope truth by the customer's own tenant even when called with the
    // all-tenants sentinel
    let totals = compute_totals(conn, customer.tenant_id, CustomerScope::Customer(customer.id))?;

    let unchanged = money_eq(customer.total_sales, totals.total_sales)
        && money_eq(customer.total_payments, totals.total_payments)
        && money_eq(customer.total_returns, totals.total_returns)
        && money_eq(customer.pending_balance, totals.pending_balance)
        && customer.last_payment_date == totals.last_payment_date;
    if unchanged {
        return Ok(RecalcOutcome::Unchanged);
    }

    store::write_customer_cache(
        conn,
        customer.id,
        &CustomerCache {
            total_sales: totals.total_sales,
            total_payments: totals.total_payments,
            total_returns: totals.total_returns,
            pending_balance: totals.pending_balance,
            last_payment_date: totals.last_payment_date,
            last_activity: customer.last_activity,
        },
    )?;
    debug!(customer_id = customer.id, balance = %totals.pending_balance, "cache rewritten");
    Ok(RecalcOutcome::Updated)
}

/// Recalculate every customer of a tenant (or all tenants via the sentinel),
/// one transaction per customer so a failure or lock stays bounded to that
/// customer.
pub fn recalculate_all(conn: &mut Connection, tenant_id: i64) -> Result<BulkOutcome> {
    let customers = store::list_customers(conn, tenant_id)?;
    let mut outcome = BulkOutcome::default();
    for c in customers {
        match recalculate(conn, c.tenant_id, c.id) {
            Ok(RecalcOutcome::Updated) => outcome.changed += 1,
            Ok(_) => outcome.unchanged += 1,
            Err(e) => {
                warn!(customer_id = c.id, error = %e, "recalculate_all: customer failed");
                outcome.failed += 1;
            }
        }
    }
    Ok(outcome)
}

enum Delta {
    Sales(Decimal),
    Payments(Decimal),
}

fn apply_delta(
    conn: &mut Connection,
    tenant_id: i64,
    customer_id: i64,
    delta: Delta,
    payment_date: Option<NaiveDate>,
    payment_removed: bool,
) -> Result<RecalcOutcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let Some(customer) = store::get_customer(&tx, tenant_id, customer_id)? else {
        warn!(customer_id, tenant_id, "delta update: customer not found, skipping");
        return Ok(RecalcOutcome::CustomerNotFound);
    };

    let (total_sales, total_payments) = match delta {
        Delta::Sales(d) => (customer.total_sales + d, customer.total_payments),
        Delta::Payments(d) => (customer.total_sales, customer.total_payments + d),
    };
    let pending =
        models::pending_balance(total_sales, total_payments, customer.total_returns);

    let last_payment_date = if payment_removed {
        // the deleted payment may have carried the max date; re-derive it
        store::max_payment_date(&tx, customer.tenant_id, CustomerScope::Customer(customer.id))?
    } else {
        match (customer.last_payment_date, payment_date) {
            (Some(cur), Some(new)) => Some(cur.max(new)),
            (cur, new) => new.or(cur),
        }
    };

    let changed = !money_eq(customer.total_sales, total_sales)
        || !money_eq(customer.total_payments, total_payments)
        || customer.last_payment_date != last_payment_date;

    store::write_customer_cache(
        &tx,
        customer.id,
        &CustomerCache {
            total_sales,
            total_payments,
            total_returns: customer.total_returns,
            pending_balance: pending,
            last_payment_date,
            last_activity: Some(Utc::now().naive_utc()),
        },
    )?;
    tx.commit()?;
    Ok(if changed {
        RecalcOutcome::Updated
    } else {
        RecalcOutcome::Unchanged
    })
}

/// A new invoice was posted for this customer.
pub fn invoice_created(
    conn: &mut Connection,
    tenant_id: i64,
    customer_id: i64,
    grand_total: Decimal,
) -> Result<RecalcOutcome> {
    apply_delta(conn, tenant_id, customer_id, Delta::Sales(grand_total), None, false)
}

/// An invoice was soft-deleted; its total leaves the aggregate.
pub fn invoice_deleted(
    conn: &mut Connection,
    tenant_id: i64,
    customer_id: i64,
    grand_total: Decimal,
) -> Result<RecalcOutcome> {
    apply_delta(conn, tenant_id, customer_id, Delta::Sales(-grand_total), None, false)
}

/// An invoice total was edited in place.
pub fn invoice_edited(
    conn: &mut Connection,
    tenant_id: i64,
    customer_id: i64,
    old_total: Decimal,
    new_total: Decimal,
) -> Result<RecalcOutcome> {
    apply_delta(
        conn,
        tenant_id,
        customer_id,
        Delta::Sales(new_total - old_total),
        None,
        false,
    )
}

/// A non-void payment was recorded against this customer.
pub fn payment_created(
    conn: &mut Connection,
    tenant_id: i64,
    customer_id: i64,
    amount: Decimal,
    payment_date: NaiveDate,
) -> Result<RecalcOutcome> {
    apply_delta(
        conn,
        tenant_id,
        customer_id,
        Delta::Payments(amount),
        Some(payment_date),
        false,
    )
}

/// A payment was deleted (or voided); its amount leaves the aggregate.
pub fn payment_deleted(
    conn: &mut Connection,
    tenant_id: i64,
    customer_id: i64,
    amount: Decimal,
) -> Result<RecalcOutcome> {
    apply_delta(conn, tenant_id, customer_id, Delta::Payments(-amount), None, true)
}
