// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Invoice-level paid amount and payment-state recalculation, derived from
//! the payment stream. Independent of the customer aggregates, but uses the
//! same non-void inclusion rule so the two derivations agree.

use crate::error::Result;
use crate::models::{CustomerScope, PaymentStatus, money_eq};
use crate::store;
use rusqlite::{Connection, TransactionBehavior, params};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::debug;

/// Recompute `paid_amount` and `payment_status` for every non-deleted
/// invoice of one customer. Returns how many invoices actually changed.
pub fn recalculate_invoice_statuses(
    conn: &mut Connection,
    tenant_id: i64,
    customer_id: i64,
) -> Result<usize> {
    recalculate_for_scope(conn, tenant_id, CustomerScope::Customer(customer_id))
}

/// Same algorithm over the walk-in population (`customer_id IS NULL`),
/// scoped by tenant.
pub fn recalculate_cash_invoice_statuses(conn: &mut Connection, tenant_id: i64) -> Result<usize> {
    recalculate_for_scope(conn, tenant_id, CustomerScope::Cash)
}

fn recalculate_for_scope(
    conn: &mut Connection,
    tenant_id: i64,
    scope: CustomerScope,
) -> Result<usize> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let invoices = store::fetch_invoices(&tx, tenant_id, scope, &Default::default())?;
    let sale_ids: Vec<i64> = invoices.iter().map(|i| i.id).collect();
    let payments = store::fetch_payments_for_sales(&tx, tenant_id, &sale_ids)?;

    let mut paid_by_sale: HashMap<i64, Decimal> = HashMap::new();
    for p in payments.iter().filter(|p| p.status.counts()) {
        if let Some(sale_id) = p.sale_id {
            *paid_by_sale.entry(sale_id).or_insert(Decimal::ZERO) += p.amount;
        }
    }

    let mut fixed = 0usize;
    for inv in &invoices {
        let paid = paid_by_sale.get(&inv.id).copied().unwrap_or(Decimal::ZERO);
        let status = PaymentStatus::for_paid(paid, inv.grand_total);
        if money_eq(inv.paid_amount, paid) && inv.payment_status == status {
            continue;
        }
        tx.execute(
            "UPDATE invoices SET paid_amount=?1, payment_status=?2 WHERE id=?3",
            params![paid.to_string(), status.as_str(), inv.id],
        )?;
        debug!(invoice_id = inv.id, paid = %paid, status = status.as_str(), "invoice status fixed");
        fixed += 1;
    }

    tx.commit()?;
    Ok(fixed)
}
