// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! The reconciled transaction timeline. Read-only: merges the three streams
//! into one deduplicated list with a running balance that ties out to the
//! customer's cached `pending_balance` over full history.
//!
//! Emission order is not calendar order: each invoice is followed
//! immediately by its own payments so a reader sees "bill, then its
//! payments" as a unit. The cash-sale variant orders strictly by date with
//! payments winning ties.

use crate::error::Result;
use crate::models::{
    CustomerScope, Invoice, LedgerEntry, LedgerKind, MONEY_EPS, Payment, ReturnNote,
};
use crate::store::{self, InvoiceFilter};
use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};

fn display_status(paid: Decimal, grand_total: Decimal) -> &'static str {
    if paid >= grand_total - *MONEY_EPS {
        "paid"
    } else if paid > *MONEY_EPS {
        "partial"
    } else {
        "unpaid"
    }
}

fn invoice_entry(inv: &Invoice, paid: Decimal) -> LedgerEntry {
    LedgerEntry {
        date: inv.invoice_date,
        kind: LedgerKind::Invoice,
        reference: inv.invoice_no.clone(),
        debit: inv.grand_total,
        credit: Decimal::ZERO,
        running_balance: Decimal::ZERO,
        sale_id: Some(inv.id),
        payment_id: None,
        status: display_status(paid, inv.grand_total).to_string(),
    }
}

fn payment_entry(p: &Payment) -> LedgerEntry {
    LedgerEntry {
        date: p.payment_date,
        kind: LedgerKind::Payment,
        reference: p
            .reference
            .clone()
            .unwrap_or_else(|| format!("PMT-{}", p.id)),
        debit: Decimal::ZERO,
        credit: p.amount,
        running_balance: Decimal::ZERO,
        sale_id: p.sale_id,
        payment_id: Some(p.id),
        status: p.status.as_str().to_string(),
    }
}

fn return_entry(r: &ReturnNote) -> LedgerEntry {
    LedgerEntry {
        date: r.return_date,
        kind: LedgerKind::Return,
        reference: r.return_no.clone(),
        debit: Decimal::ZERO,
        credit: r.grand_total,
        running_balance: Decimal::ZERO,
        sale_id: None,
        payment_id: None,
        status: "return".to_string(),
    }
}

/// Drop repeats of the same underlying fact, then assign the running
/// balance. The composite key guards against one row being surfaced twice
/// by overlapping upstream queries.
fn dedup_and_run(entries: Vec<LedgerEntry>, opening_balance: Decimal) -> Vec<LedgerEntry> {
    let mut seen: HashSet<(Option<i64>, Option<i64>, NaiveDate, Decimal)> = HashSet::new();
    let mut balance = opening_balance;
    let mut out = Vec::with_capacity(entries.len());
    for mut e in entries {
        let key = (e.sale_id, e.payment_id, e.date, e.debit + e.credit);
        if !seen.insert(key) {
            continue;
        }
        balance = balance + e.debit - e.credit;
        e.running_balance = balance;
        out.push(e);
    }
    out
}

fn paid_by_sale(payments: &[Payment]) -> HashMap<i64, Decimal> {
    let mut map: HashMap<i64, Decimal> = HashMap::new();
    for p in payments {
        if let Some(sale_id) = p.sale_id {
            *map.entry(sale_id).or_insert(Decimal::ZERO) += p.amount;
        }
    }
    map
}

/// Build one customer's ledger. Filters narrow the invoice set; the payment
/// side is derived from that set plus standalone payments in the date
/// window. `opening_balance` seeds the running balance for statement
/// generation (defaults to zero).
pub fn build_ledger(
    conn: &Connection,
    tenant_id: i64,
    customer_id: i64,
    filter: &InvoiceFilter,
    opening_balance: Option<Decimal>,
) -> Result<Vec<LedgerEntry>> {
    let scope = CustomerScope::Customer(customer_id);
    let mut invoices = store::fetch_invoices(conn, tenant_id, scope, filter)?;
    let sale_ids: Vec<i64> = invoices.iter().map(|i| i.id).collect();
    let mut linked: Vec<Payment> = store::fetch_payments_for_sales(conn, tenant_id, &sale_ids)?
        .into_iter()
        .filter(|p| p.status.counts())
        .collect();
    // payments of soft-deleted invoices still count toward the cached
    // aggregates, so they ride along with the standalone ones here
    let mut standalone: Vec<Payment> =
        store::fetch_standalone_payments(conn, tenant_id, scope, filter.from, filter.to)?
            .into_iter()
            .chain(store::fetch_orphaned_payments(
                conn, tenant_id, scope, filter.from, filter.to,
            )?)
            .filter(|p| p.status.counts())
            .collect();
    standalone.sort_by_key(|p| (p.payment_date, p.id));
    let returns = store::fetch_returns(conn, tenant_id, scope, filter.from, filter.to)?;

    let paid = paid_by_sale(&linked);

    invoices.sort_by_key(|i| (i.invoice_date, i.id));
    linked.sort_by_key(|p| (p.payment_date, p.id));

    let mut entries = Vec::new();
    for inv in &invoices {
        entries.push(invoice_entry(
            inv,
            paid.get(&inv.id).copied().unwrap_or(Decimal::ZERO),
        ));
        for p in linked.iter().filter(|p| p.sale_id == Some(inv.id)) {
            entries.push(payment_entry(p));
        }
    }
    for p in &standalone {
        entries.push(payment_entry(p));
    }
    for r in &returns {
        entries.push(return_entry(r));
    }

    Ok(dedup_and_run(entries, opening_balance.unwrap_or(Decimal::ZERO)))
}

/// Aggregate ledger over the walk-in population (`customer_id IS NULL`) of
/// one tenant. Strict date order, payments before invoices on equal dates.
pub fn build_cash_ledger(conn: &Connection, tenant_id: i64) -> Result<Vec<LedgerEntry>> {
    let scope = CustomerScope::Cash;
    let invoices = store::fetch_invoices(conn, tenant_id, scope, &InvoiceFilter::default())?;
    let payments: Vec<Payment> = store::fetch_payments(conn, tenant_id, scope)?
        .into_iter()
        .filter(|p| p.status.counts())
        .collect();
    let returns = store::fetch_returns(conn, tenant_id, scope, None, None)?;

    let paid = paid_by_sale(&payments);

    let mut entries = Vec::new();
    for inv in &invoices {
        entries.push(invoice_entry(
            inv,
            paid.get(&inv.id).copied().unwrap_or(Decimal::ZERO),
        ));
    }
    for p in &payments {
        entries.push(payment_entry(p));
    }
    for r in &returns {
        entries.push(return_entry(r));
    }

    fn rank(kind: LedgerKind) -> u8 {
        match kind {
            LedgerKind::Payment => 0,
            LedgerKind::Invoice => 1,
            LedgerKind::Return => 2,
        }
    }
    entries.sort_by_key(|e| {
        (
            e.date,
            rank(e.kind),
            e.payment_id.or(e.sale_id).unwrap_or(i64::MAX),
        )
    });

    Ok(dedup_and_run(entries, Decimal::ZERO))
}
