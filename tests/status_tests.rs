// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use rusqlite::{Connection, params};
use rust_decimal::Decimal;
use tallyclip::models::{CustomerScope, PaymentStatus};
use tallyclip::status;
use tallyclip::store::{self, InvoiceFilter};

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn setup() -> Connection {
    tallyclip::db::open_in_memory().unwrap()
}

fn add_customer(conn: &Connection, id: i64, tenant: i64) {
    conn.execute(
        "INSERT INTO customers(id, tenant_id, name) VALUES (?1, ?2, ?3)",
        params![id, tenant, format!("C{}", id)],
    )
    .unwrap();
}

fn add_invoice(conn: &Connection, id: i64, tenant: i64, customer: Option<i64>, total: &str) {
    conn.execute(
        "INSERT INTO invoices(id, tenant_id, customer_id, invoice_no, grand_total, invoice_date)
         VALUES (?1, ?2, ?3, ?4, ?5, '2025-01-01')",
        params![id, tenant, customer, format!("INV-{}", id), total],
    )
    .unwrap();
}

fn add_payment(
    conn: &Connection,
    id: i64,
    tenant: i64,
    sale: Option<i64>,
    amount: &str,
    status: &str,
) {
    conn.execute(
        "INSERT INTO payments(id, tenant_id, customer_id, sale_id, amount, status, mode, payment_date)
         VALUES (?1, ?2, NULL, ?3, ?4, ?5, 'cash', '2025-01-05')",
        params![id, tenant, sale, amount, status],
    )
    .unwrap();
}

fn invoice(
    conn: &Connection,
    tenant: i64,
    scope: CustomerScope,
    id: i64,
) -> tallyclip::models::Invoice {
    store::fetch_invoices(conn, tenant, scope, &InvoiceFilter::default())
        .unwrap()
        .into_iter()
        .find(|i| i.id == id)
        .unwrap()
}

#[test]
fn partial_payment_marks_invoice_partial() {
    let mut conn = setup();
    add_customer(&conn, 1, 1);
    add_invoice(&conn, 1, 1, Some(1), "200");
    conn.execute(
        "INSERT INTO payments(id, tenant_id, customer_id, sale_id, amount, status, mode, payment_date)
         VALUES (1, 1, 1, 1, '120', 'cleared', 'cash', '2025-01-05')",
        [],
    )
    .unwrap();

    let fixed = status::recalculate_invoice_statuses(&mut conn, 1, 1).unwrap();
    assert_eq!(fixed, 1);

    let inv = invoice(&conn, 1, CustomerScope::Customer(1), 1);
    assert_eq!(inv.paid_amount, dec("120"));
    assert_eq!(inv.payment_status, PaymentStatus::Partial);
}

#[test]
fn full_payment_within_tolerance_marks_paid() {
    let mut conn = setup();
    add_customer(&conn, 1, 1);
    add_invoice(&conn, 1, 1, Some(1), "200");
    conn.execute(
        "INSERT INTO payments(id, tenant_id, customer_id, sale_id, amount, status, mode, payment_date)
         VALUES (1, 1, 1, 1, '199.99', 'cleared', 'cash', '2025-01-05')",
        [],
    )
    .unwrap();

    status::recalculate_invoice_statuses(&mut conn, 1, 1).unwrap();
    let inv = invoice(&conn, 1, CustomerScope::Customer(1), 1);
    assert_eq!(inv.payment_status, PaymentStatus::Paid);
}

#[test]
fn void_payments_do_not_pay_invoices() {
    let mut conn = setup();
    add_customer(&conn, 1, 1);
    add_invoice(&conn, 1, 1, Some(1), "200");
    conn.execute(
        "INSERT INTO payments(id, tenant_id, customer_id, sale_id, amount, status, mode, payment_date)
         VALUES (1, 1, 1, 1, '200', 'void', 'cash', '2025-01-05')",
        [],
    )
    .unwrap();

    status::recalculate_invoice_statuses(&mut conn, 1, 1).unwrap();
    let inv = invoice(&conn, 1, CustomerScope::Customer(1), 1);
    assert_eq!(inv.paid_amount, Decimal::ZERO);
    assert_eq!(inv.payment_status, PaymentStatus::Pending);
}

#[test]
fn second_run_fixes_nothing() {
    let mut conn = setup();
    add_customer(&conn, 1, 1);
    add_invoice(&conn, 1, 1, Some(1), "200");
    conn.execute(
        "INSERT INTO payments(id, tenant_id, customer_id, sale_id, amount, status, mode, payment_date)
         VALUES (1, 1, 1, 1, '200', 'cleared', 'cash', '2025-01-05')",
        [],
    )
    .unwrap();

    assert_eq!(status::recalculate_invoice_statuses(&mut conn, 1, 1).unwrap(), 1);
    assert_eq!(status::recalculate_invoice_statuses(&mut conn, 1, 1).unwrap(), 0);
}

#[test]
fn cash_variant_covers_walk_in_invoices() {
    let mut conn = setup();
    add_invoice(&conn, 1, 1, None, "100");
    add_invoice(&conn, 2, 2, None, "100");
    add_payment(&conn, 1, 1, Some(1), "100", "cleared");

    let fixed = status::recalculate_cash_invoice_statuses(&mut conn, 1).unwrap();
    assert_eq!(fixed, 1);

    let inv = invoice(&conn, 1, CustomerScope::Cash, 1);
    assert_eq!(inv.payment_status, PaymentStatus::Paid);
    // the other tenant's walk-in invoice is untouched
    let other = invoice(&conn, 2, CustomerScope::Cash, 2);
    assert_eq!(other.payment_status, PaymentStatus::Pending);
    assert_eq!(other.paid_amount, Decimal::ZERO);
}

#[test]
fn deleted_invoices_are_skipped() {
    let mut conn = setup();
    add_customer(&conn, 1, 1);
    add_invoice(&conn, 1, 1, Some(1), "200");
    conn.execute("UPDATE invoices SET is_deleted=1 WHERE id=1", []).unwrap();
    conn.execute(
        "INSERT INTO payments(id, tenant_id, customer_id, sale_id, amount, status, mode, payment_date)
         VALUES (1, 1, 1, 1, '200', 'cleared', 'cash', '2025-01-05')",
        [],
    )
    .unwrap();

    assert_eq!(status::recalculate_invoice_statuses(&mut conn, 1, 1).unwrap(), 0);
}
