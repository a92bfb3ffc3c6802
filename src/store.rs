// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Shared data-access contracts over the three transaction streams and the
//! customer cache. Every query is tenant-filtered unless the caller passes
//! [`ALL_TENANTS`], which deliberately widens the scope to every tenant.

use crate::error::{Error, Result};
use crate::models::{
    ALL_TENANTS, Customer, CustomerScope, Invoice, Payment, PaymentMode, PaymentState,
    PaymentStatus, ReturnNote,
};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::warn;

/// Optional narrowing applied to invoice queries (and, through the invoice
/// set, to the ledger's payment selection).
#[derive(Debug, Clone, Default)]
pub struct InvoiceFilter {
    pub branch_id: Option<i64>,
    pub route_id: Option<i64>,
    pub created_by: Option<i64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// The cached aggregate fields written back onto a customer row.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerCache {
    pub total_sales: Decimal,
    pub total_payments: Decimal,
    pub total_returns: Decimal,
    pub pending_balance: Decimal,
    pub last_payment_date: Option<NaiveDate>,
    pub last_activity: Option<NaiveDateTime>,
}

fn parse_money(what: &'static str, s: &str) -> Result<Decimal> {
    s.parse::<Decimal>()
        .map_err(|e| Error::corrupt(what, format!("'{}': {}", s, e)))
}

fn parse_status(s: &str) -> Result<PaymentStatus> {
    PaymentStatus::parse(s).ok_or_else(|| Error::corrupt("payment_status", s.to_string()))
}

fn parse_state(s: &str) -> Result<PaymentState> {
    PaymentState::parse(s).ok_or_else(|| Error::corrupt("payment state", s.to_string()))
}

fn parse_mode(s: &str) -> Result<PaymentMode> {
    PaymentMode::parse(s).ok_or_else(|| Error::corrupt("payment mode", s.to_string()))
}

fn push_tenant(sql: &mut String, args: &mut Vec<String>, tenant_id: i64) {
    if tenant_id != ALL_TENANTS {
        sql.push_str(" AND tenant_id=?");
        args.push(tenant_id.to_string());
    }
}

fn push_scope(sql: &mut String, args: &mut Vec<String>, scope: CustomerScope) {
    match scope {
        CustomerScope::Customer(id) => {
            sql.push_str(" AND customer_id=?");
            args.push(id.to_string());
        }
        CustomerScope::Cash => sql.push_str(" AND customer_id IS NULL"),
    }
}

fn push_date_window(
    sql: &mut String,
    args: &mut Vec<String>,
    column: &str,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) {
    if let Some(d) = from {
        sql.push_str(&format!(" AND {}>=?", column));
        args.push(d.to_string());
    }
    if let Some(d) = to {
        sql.push_str(&format!(" AND {}<=?", column));
        args.push(d.to_string());
    }
}

pub fn get_customer(
    conn: &Connection,
    tenant_id: i64,
    customer_id: i64,
) -> Result<Option<Customer>> {
    let mut sql = String::from(
        "SELECT id, tenant_id, name, total_sales, total_payments, total_returns,
                pending_balance, credit_limit, last_payment_date, last_activity
         FROM customers WHERE id=?",
    );
    let mut args = vec![customer_id.to_string()];
    push_tenant(&mut sql, &mut args, tenant_id);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(args.iter()))?;
    match rows.next()? {
        Some(r) => Ok(Some(customer_from_row(r)?)),
        None => Ok(None),
    }
}

pub fn list_customers(conn: &Connection, tenant_id: i64) -> Result<Vec<Customer>> {
    let mut sql = String::from(
        "SELECT id, tenant_id, name, total_sales, total_payments, total_returns,
                pending_balance, credit_limit, last_payment_date, last_activity
         FROM customers WHERE 1=1",
    );
    let mut args = Vec::new();
    push_tenant(&mut sql, &mut args, tenant_id);
    sql.push_str(" ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(args.iter()))?;
    let mut out = Vec::new();
    while let Some(r) = rows.next()? {
        out.push(customer_from_row(r)?);
    }
    Ok(out)
}

fn customer_from_row(r: &rusqlite::Row<'_>) -> Result<Customer> {
    let total_sales: String = r.get(3)?;
    let total_payments: String = r.get(4)?;
    let total_returns: String = r.get(5)?;
    let pending_balance: String = r.get(6)?;
    let credit_limit: String = r.get(7)?;
    Ok(Customer {
        id: r.get(0)?,
        tenant_id: r.get(1)?,
        name: r.get(2)?,
        total_sales: parse_money("total_sales", &total_sales)?,
        total_payments: parse_money("total_payments", &total_payments)?,
        total_returns: parse_money("total_returns", &total_returns)?,
        pending_balance: parse_money("pending_balance", &pending_balance)?,
        credit_limit: parse_money("credit_limit", &credit_limit)?,
        last_payment_date: r.get(8)?,
        last_activity: r.get(9)?,
    })
}

pub fn write_customer_cache(
    conn: &Connection,
    customer_id: i64,
    cache: &CustomerCache,
) -> Result<()> {
    conn.execute(
        "UPDATE customers SET total_sales=?1, total_payments=?2, total_returns=?3,
            pending_balance=?4, last_payment_date=?5, last_activity=?6
         WHERE id=?7",
        params![
            cache.total_sales.to_string(),
            cache.total_payments.to_string(),
            cache.total_returns.to_string(),
            cache.pending_balance.to_string(),
            cache.last_payment_date,
            cache.last_activity,
            customer_id
        ],
    )?;
    Ok(())
}

const INVOICE_COLS: &str = "id, tenant_id, customer_id, invoice_no, grand_total, paid_amount,
    payment_status, invoice_date, due_date, branch_id, route_id, created_by, is_deleted";

/// Non-deleted invoices for a scope, narrowed by the optional filter.
pub fn fetch_invoices(
    conn: &Connection,
    tenant_id: i64,
    scope: CustomerScope,
    filter: &InvoiceFilter,
) -> Result<Vec<Invoice>> {
    let mut sql = format!("SELECT {} FROM invoices WHERE is_deleted=0", INVOICE_COLS);
    let mut args = Vec::new();
    push_tenant(&mut sql, &mut args, tenant_id);
    push_scope(&mut sql, &mut args, scope);
    if let Some(b) = filter.branch_id {
        sql.push_str(" AND branch_id=?");
        args.push(b.to_string());
    }
    if let Some(rt) = filter.route_id {
        sql.push_str(" AND route_id=?");
        args.push(rt.to_string());
    }
    if let Some(u) = filter.created_by {
        sql.push_str(" AND created_by=?");
        args.push(u.to_string());
    }
    push_date_window(&mut sql, &mut args, "invoice_date", filter.from, filter.to);
    sql.push_str(" ORDER BY invoice_date, id");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(args.iter()))?;
    let mut out = Vec::new();
    while let Some(r) = rows.next()? {
        out.push(invoice_from_row(r)?);
    }
    Ok(out)
}

fn invoice_from_row(r: &rusqlite::Row<'_>) -> Result<Invoice> {
    let grand_total: String = r.get(4)?;
    let paid_amount: String = r.get(5)?;
    let status: String = r.get(6)?;
    Ok(Invoice {
        id: r.get(0)?,
        tenant_id: r.get(1)?,
        customer_id: r.get(2)?,
        invoice_no: r.get(3)?,
        grand_total: parse_money("grand_total", &grand_total)?,
        paid_amount: parse_money("paid_amount", &paid_amount)?,
        payment_status: parse_status(&status)?,
        invoice_date: r.get(7)?,
        due_date: r.get(8)?,
        branch_id: r.get(9)?,
        route_id: r.get(10)?,
        created_by: r.get(11)?,
        is_deleted: r.get::<_, i64>(12)? != 0,
    })
}

const PAYMENT_COLS: &str =
    "id, tenant_id, customer_id, sale_id, amount, status, mode, payment_date, reference";
const PAYMENT_COLS_P: &str = "p.id, p.tenant_id, p.customer_id, p.sale_id, p.amount, p.status,
    p.mode, p.payment_date, p.reference";

/// Every payment for a scope, in any state. Callers apply the non-void rule.
pub fn fetch_payments(
    conn: &Connection,
    tenant_id: i64,
    scope: CustomerScope,
) -> Result<Vec<Payment>> {
    let mut sql = format!("SELECT {} FROM payments WHERE 1=1", PAYMENT_COLS);
    let mut args = Vec::new();
    push_tenant(&mut sql, &mut args, tenant_id);
    push_scope(&mut sql, &mut args, scope);
    sql.push_str(" ORDER BY payment_date, id");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(args.iter()))?;
    let mut out = Vec::new();
    while let Some(r) = rows.next()? {
        out.push(payment_from_row(r)?);
    }
    Ok(out)
}

/// Payments linked to any of the given invoice ids.
pub fn fetch_payments_for_sales(
    conn: &Connection,
    tenant_id: i64,
    sale_ids: &[i64],
) -> Result<Vec<Payment>> {
    if sale_ids.is_empty() {
        return Ok(Vec::new());
    }
    let marks = vec!["?"; sale_ids.len()].join(",");
    let mut sql = format!(
        "SELECT {} FROM payments WHERE sale_id IN ({})",
        PAYMENT_COLS, marks
    );
    let mut args: Vec<String> = sale_ids.iter().map(|id| id.to_string()).collect();
    push_tenant(&mut sql, &mut args, tenant_id);
    sql.push_str(" ORDER BY payment_date, id");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(args.iter()))?;
    let mut out = Vec::new();
    while let Some(r) = rows.next()? {
        out.push(payment_from_row(r)?);
    }
    Ok(out)
}

/// Payments not linked to any invoice (applied to the customer balance
/// generally), within an optional date window.
pub fn fetch_standalone_payments(
    conn: &Connection,
    tenant_id: i64,
    scope: CustomerScope,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<Vec<Payment>> {
    let mut sql = format!("SELECT {} FROM payments WHERE sale_id IS NULL", PAYMENT_COLS);
    let mut args = Vec::new();
    push_tenant(&mut sql, &mut args, tenant_id);
    push_scope(&mut sql, &mut args, scope);
    push_date_window(&mut sql, &mut args, "payment_date", from, to);
    sql.push_str(" ORDER BY payment_date, id");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(args.iter()))?;
    let mut out = Vec::new();
    while let Some(r) = rows.next()? {
        out.push(payment_from_row(r)?);
    }
    Ok(out)
}

/// Payments linked to an invoice that has since been soft-deleted (or is
/// gone entirely). They still count toward the customer aggregates, so the
/// ledger has to surface them alongside the standalone ones.
pub fn fetch_orphaned_payments(
    conn: &Connection,
    tenant_id: i64,
    scope: CustomerScope,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<Vec<Payment>> {
    let mut sql = format!(
        "SELECT {} FROM payments p WHERE p.sale_id IS NOT NULL
         AND NOT EXISTS (SELECT 1 FROM invoices i WHERE i.id=p.sale_id AND i.is_deleted=0)",
        PAYMENT_COLS_P
    );
    let mut args = Vec::new();
    if tenant_id != ALL_TENANTS {
        sql.push_str(" AND p.tenant_id=?");
        args.push(tenant_id.to_string());
    }
    match scope {
        CustomerScope::Customer(id) => {
            sql.push_str(" AND p.customer_id=?");
            args.push(id.to_string());
        }
        CustomerScope::Cash => sql.push_str(" AND p.customer_id IS NULL"),
    }
    push_date_window(&mut sql, &mut args, "p.payment_date", from, to);
    sql.push_str(" ORDER BY p.payment_date, p.id");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(args.iter()))?;
    let mut out = Vec::new();
    while let Some(r) = rows.next()? {
        out.push(payment_from_row(r)?);
    }
    Ok(out)
}

fn payment_from_row(r: &rusqlite::Row<'_>) -> Result<Payment> {
    let amount: String = r.get(4)?;
    let status: String = r.get(5)?;
    let mode: String = r.get(6)?;
    Ok(Payment {
        id: r.get(0)?,
        tenant_id: r.get(1)?,
        customer_id: r.get(2)?,
        sale_id: r.get(3)?,
        amount: parse_money("amount", &amount)?,
        status: parse_state(&status)?,
        mode: parse_mode(&mode)?,
        payment_date: r.get(7)?,
        reference: r.get(8)?,
    })
}

pub fn fetch_returns(
    conn: &Connection,
    tenant_id: i64,
    scope: CustomerScope,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<Vec<ReturnNote>> {
    let mut sql = String::from(
        "SELECT id, tenant_id, customer_id, return_no, grand_total, return_date
         FROM returns WHERE 1=1",
    );
    let mut args = Vec::new();
    push_tenant(&mut sql, &mut args, tenant_id);
    push_scope(&mut sql, &mut args, scope);
    push_date_window(&mut sql, &mut args, "return_date", from, to);
    sql.push_str(" ORDER BY return_date, id");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(args.iter()))?;
    let mut out = Vec::new();
    while let Some(r) = rows.next()? {
        let grand_total: String = r.get(4)?;
        out.push(ReturnNote {
            id: r.get(0)?,
            tenant_id: r.get(1)?,
            customer_id: r.get(2)?,
            return_no: r.get(3)?,
            grand_total: parse_money("grand_total", &grand_total)?,
            return_date: r.get(5)?,
        });
    }
    Ok(out)
}

/// Latest payment date for a scope across every payment state.
pub fn max_payment_date(
    conn: &Connection,
    tenant_id: i64,
    scope: CustomerScope,
) -> Result<Option<NaiveDate>> {
    let mut sql = String::from("SELECT MAX(payment_date) FROM payments WHERE 1=1");
    let mut args = Vec::new();
    push_tenant(&mut sql, &mut args, tenant_id);
    push_scope(&mut sql, &mut args, scope);
    let d: Option<NaiveDate> = conn
        .query_row(&sql, params_from_iter(args.iter()), |r| r.get(0))
        .optional()?
        .flatten();
    Ok(d)
}

/// Per-customer sums from one scan of a stream. A row that fails to parse
/// marks its customer corrupt instead of aborting the whole scan.
#[derive(Debug, Default)]
pub struct GroupedSums {
    pub totals: HashMap<i64, Decimal>,
    pub corrupt: Vec<i64>,
}

impl GroupedSums {
    pub fn total_for(&self, customer_id: i64) -> Decimal {
        self.totals.get(&customer_id).copied().unwrap_or(Decimal::ZERO)
    }
}

/// Per-customer invoice totals for a tenant in one scan (bulk mismatch
/// detection avoids a query per customer). Sums are done in Rust so decimal
/// text never goes through SQLite float arithmetic.
pub fn sales_by_customer(conn: &Connection, tenant_id: i64) -> Result<GroupedSums> {
    let mut sql = String::from(
        "SELECT customer_id, grand_total FROM invoices
         WHERE is_deleted=0 AND customer_id IS NOT NULL",
    );
    let mut args = Vec::new();
    push_tenant(&mut sql, &mut args, tenant_id);
    group_sums(conn, &sql, &args, "grand_total")
}

/// Per-customer non-void payment totals for a tenant in one scan.
pub fn payments_by_customer(conn: &Connection, tenant_id: i64) -> Result<GroupedSums> {
    let mut sql = String::from(
        "SELECT customer_id, amount FROM payments
         WHERE status!='void' AND customer_id IS NOT NULL",
    );
    let mut args = Vec::new();
    push_tenant(&mut sql, &mut args, tenant_id);
    group_sums(conn, &sql, &args, "amount")
}

/// Per-customer return totals for a tenant in one scan.
pub fn returns_by_customer(conn: &Connection, tenant_id: i64) -> Result<GroupedSums> {
    let mut sql = String::from(
        "SELECT customer_id, grand_total FROM returns WHERE customer_id IS NOT NULL",
    );
    let mut args = Vec::new();
    push_tenant(&mut sql, &mut args, tenant_id);
    group_sums(conn, &sql, &args, "grand_total")
}

fn group_sums(
    conn: &Connection,
    sql: &str,
    args: &[String],
    what: &'static str,
) -> Result<GroupedSums> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params_from_iter(args.iter()))?;
    let mut out = GroupedSums::default();
    while let Some(r) = rows.next()? {
        let customer_id: i64 = r.get(0)?;
        let amount: String = r.get(1)?;
        match parse_money(what, &amount) {
            Ok(v) => *out.totals.entry(customer_id).or_insert(Decimal::ZERO) += v,
            Err(e) => {
                warn!(customer_id, error = %e, "skipping corrupt row in bulk scan");
                out.corrupt.push(customer_id);
            }
        }
    }
    Ok(out)
}
