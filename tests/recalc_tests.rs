// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use rusqlite::{Connection, params};
use rust_decimal::Decimal;
use tallyclip::recalc::{self, RecalcOutcome};
use tallyclip::store;

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

fn add_invoice(
    conn: &Connection,
    id: i64,
    tenant: i64,
    customer: Option<i64>,
    total: &str,
    date: &str,
) {
    conn.execute(
        "INSERT INTO invoices(id, tenant_id, customer_id, invoice_no, grand_total, invoice_date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![id, tenant, customer, format!("INV-{}", id), total, date],
    )
    .unwrap();
}

fn add_payment(
    conn: &Connection,
    id: i64,
    tenant: i64,
    customer: Option<i64>,
    sale: Option<i64>,
    amount: &str,
    status: &str,
    date: &str,
) {
    conn.execute(
        "INSERT INTO payments(id, tenant_id, customer_id, sale_id, amount, status, mode, payment_date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'cash', ?7)",
        params![id, tenant, customer, sale, amount, status, date],
    )
    .unwrap();
}

fn add_return(
    conn: &Connection,
    id: i64,
    tenant: i64,
    customer: Option<i64>,
    total: &str,
    date: &str,
) {
    conn.execute(
        "INSERT INTO returns(id, tenant_id, customer_id, return_no, grand_total, return_date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![id, tenant, customer, format!("RET-{}", id), total, date],
    )
    .unwrap();
}

#[test]
fn scenario_basic_invoice_and_partial_payment() {
    let mut conn = setup();
    add_customer(&conn, 1, 1);
    add_invoice(&conn, 1, 1, Some(1), "200", "2025-01-01");
    add_payment(&conn, 1, 1, Some(1), Some(1), "120", "cleared", "2025-01-05");

    let outcome = recalc::recalculate(&mut conn, 1, 1).unwrap();
    assert_eq!(outcome, RecalcOutcome::Updated);

    let c = store::get_customer(&conn, 1, 1).unwrap().unwrap();
    assert_eq!(c.total_sales, dec("200"));
    assert_eq!(c.total_payments, dec("120"));
    assert_eq!(c.pending_balance, dec("80"));
    assert_eq!(c.last_payment_date, Some("2025-01-05".parse().unwrap()));
}

#[test]
fn recalculate_is_idempotent() {
    let mut conn = setup();
    add_customer(&conn, 1, 1);
    add_invoice(&conn, 1, 1, Some(1), "200", "2025-01-01");
    add_payment(&conn, 1, 1, Some(1), Some(1), "120", "cleared", "2025-01-05");

    assert_eq!(recalc::recalculate(&mut conn, 1, 1).unwrap(), RecalcOutcome::Updated);
    let first = store::get_customer(&conn, 1, 1).unwrap().unwrap();
    assert_eq!(recalc::recalculate(&mut conn, 1, 1).unwrap(), RecalcOutcome::Unchanged);
    let second = store::get_customer(&conn, 1, 1).unwrap().unwrap();
    assert_eq!(first.pending_balance, second.pending_balance);
    assert_eq!(first.total_sales, second.total_sales);
    assert_eq!(first.total_payments, second.total_payments);
}

#[test]
fn returns_credit_the_balance() {
    let mut conn = setup();
    add_customer(&conn, 1, 1);
    add_invoice(&conn, 1, 1, Some(1), "500", "2025-01-01");
    add_return(&conn, 1, 1, Some(1), "75", "2025-01-10");

    recalc::recalculate(&mut conn, 1, 1).unwrap();
    let c = store::get_customer(&conn, 1, 1).unwrap().unwrap();
    assert_eq!(c.total_returns, dec("75"));
    assert_eq!(c.pending_balance, dec("425"));
}

#[test]
fn void_payments_never_count() {
    let mut conn = setup();
    add_customer(&conn, 1, 1);
    add_invoice(&conn, 1, 1, Some(1), "200", "2025-01-01");
    add_payment(&conn, 1, 1, Some(1), Some(1), "120", "cleared", "2025-01-05");
    recalc::recalculate(&mut conn, 1, 1).unwrap();
    let before = store::get_customer(&conn, 1, 1).unwrap().unwrap();

    add_payment(&conn, 2, 1, Some(1), Some(1), "50", "void", "2025-01-06");
    recalc::recalculate(&mut conn, 1, 1).unwrap();
    let after = store::get_customer(&conn, 1, 1).unwrap().unwrap();
    assert_eq!(before.total_payments, after.total_payments);
    assert_eq!(before.pending_balance, after.pending_balance);

    conn.execute("DELETE FROM payments WHERE id=2", []).unwrap();
    recalc::recalculate(&mut conn, 1, 1).unwrap();
    let removed = store::get_customer(&conn, 1, 1).unwrap().unwrap();
    assert_eq!(before.total_payments, removed.total_payments);
}

#[test]
fn pending_payments_count_toward_totals() {
    let mut conn = setup();
    add_customer(&conn, 1, 1);
    add_invoice(&conn, 1, 1, Some(1), "200", "2025-01-01");
    add_payment(&conn, 1, 1, Some(1), Some(1), "80", "pending", "2025-01-05");

    recalc::recalculate(&mut conn, 1, 1).unwrap();
    let c = store::get_customer(&conn, 1, 1).unwrap().unwrap();
    assert_eq!(c.total_payments, dec("80"));
    assert_eq!(c.pending_balance, dec("120"));
}

#[test]
fn soft_deleted_invoices_leave_the_aggregate() {
    let mut conn = setup();
    add_customer(&conn, 1, 1);
    add_invoice(&conn, 1, 1, Some(1), "200", "2025-01-01");
    add_invoice(&conn, 2, 1, Some(1), "300", "2025-01-02");
    conn.execute("UPDATE invoices SET is_deleted=1 WHERE id=2", []).unwrap();

    recalc::recalculate(&mut conn, 1, 1).unwrap();
    let c = store::get_customer(&conn, 1, 1).unwrap().unwrap();
    assert_eq!(c.total_sales, dec("200"));
}

#[test]
fn missing_customer_is_a_no_op() {
    let mut conn = setup();
    let outcome = recalc::recalculate(&mut conn, 1, 999).unwrap();
    assert_eq!(outcome, RecalcOutcome::CustomerNotFound);
}

#[test]
fn incremental_path_agrees_with_full_recalculation() {
    let mut conn = setup();
    add_customer(&conn, 1, 1);

    // mirror every delta against the stores, then check a full pass finds
    // nothing to fix
    add_invoice(&conn, 1, 1, Some(1), "200", "2025-01-01");
    recalc::invoice_created(&mut conn, 1, 1, dec("200")).unwrap();

    add_payment(&conn, 1, 1, Some(1), Some(1), "120", "cleared", "2025-01-05");
    recalc::payment_created(&mut conn, 1, 1, dec("120"), "2025-01-05".parse().unwrap()).unwrap();

    conn.execute("UPDATE invoices SET grand_total='250' WHERE id=1", []).unwrap();
    recalc::invoice_edited(&mut conn, 1, 1, dec("200"), dec("250")).unwrap();

    add_payment(&conn, 2, 1, Some(1), None, "30", "cleared", "2025-01-08");
    recalc::payment_created(&mut conn, 1, 1, dec("30"), "2025-01-08".parse().unwrap()).unwrap();

    conn.execute("DELETE FROM payments WHERE id=2", []).unwrap();
    recalc::payment_deleted(&mut conn, 1, 1, dec("30")).unwrap();

    let cached = store::get_customer(&conn, 1, 1).unwrap().unwrap();
    assert_eq!(cached.total_sales, dec("250"));
    assert_eq!(cached.total_payments, dec("120"));
    assert_eq!(cached.pending_balance, dec("130"));
    assert_eq!(cached.last_payment_date, Some("2025-01-05".parse().unwrap()));

    assert_eq!(recalc::recalculate(&mut conn, 1, 1).unwrap(), RecalcOutcome::Unchanged);
}

#[test]
fn incremental_invoice_delete_mirrors_store() {
    let mut conn = setup();
    add_customer(&conn, 1, 1);
    add_invoice(&conn, 1, 1, Some(1), "200", "2025-01-01");
    recalc::invoice_created(&mut conn, 1, 1, dec("200")).unwrap();

    conn.execute("UPDATE invoices SET is_deleted=1 WHERE id=1", []).unwrap();
    recalc::invoice_deleted(&mut conn, 1, 1, dec("200")).unwrap();

    let cached = store::get_customer(&conn, 1, 1).unwrap().unwrap();
    assert_eq!(cached.total_sales, Decimal::ZERO);
    assert_eq!(cached.pending_balance, Decimal::ZERO);
    assert_eq!(recalc::recalculate(&mut conn, 1, 1).unwrap(), RecalcOutcome::Unchanged);
}

#[test]
fn incremental_update_refreshes_last_activity() {
    let mut conn = setup();
    add_customer(&conn, 1, 1);
    add_invoice(&conn, 1, 1, Some(1), "100", "2025-01-01");
    recalc::invoice_created(&mut conn, 1, 1, dec("100")).unwrap();
    let c = store::get_customer(&conn, 1, 1).unwrap().unwrap();
    assert!(c.last_activity.is_some());
}

#[test]
fn recalculate_all_counts_changed_and_failed() {
    let mut conn = setup();
    add_customer(&conn, 1, 1);
    add_customer(&conn, 2, 1);
    add_customer(&conn, 3, 1);
    add_invoice(&conn, 1, 1, Some(1), "100", "2025-01-01");
    // customer 3 carries an unparseable cached value
    conn.execute("UPDATE customers SET total_sales='garbage' WHERE id=3", []).unwrap();

    let outcome = recalc::recalculate_all(&mut conn, 1).unwrap();
    assert_eq!(outcome.changed, 1);
    assert_eq!(outcome.unchanged, 1);
    assert_eq!(outcome.failed, 1);
}

#[test]
fn recalculate_all_spans_tenants_with_sentinel() {
    let mut conn = setup();
    add_customer(&conn, 1, 1);
    add_customer(&conn, 2, 2);
    add_invoice(&conn, 1, 1, Some(1), "100", "2025-01-01");
    add_invoice(&conn, 2, 2, Some(2), "50", "2025-01-02");

    let scoped = recalc::recalculate_all(&mut conn, 1).unwrap();
    assert_eq!(scoped.changed, 1);

    let all = recalc::recalculate_all(&mut conn, tallyclip::ALL_TENANTS).unwrap();
    assert_eq!(all.changed, 1); // tenant 2 still pending
    assert_eq!(all.unchanged, 1);
}

#[test]
fn tenant_isolation_in_totals() {
    let mut conn = setup();
    add_customer(&conn, 1, 1);
    add_invoice(&conn, 1, 1, Some(1), "100", "2025-01-01");
    // same customer id cannot exist twice, but a stray row in another tenant
    // referencing this customer must not leak in
    add_invoice(&conn, 2, 2, Some(1), "999", "2025-01-01");

    recalc::recalculate(&mut conn, 1, 1).unwrap();
    let c = store::get_customer(&conn, 1, 1).unwrap().unwrap();
    assert_eq!(c.total_sales, dec("100"));
}

#[test]
fn opens_and_reopens_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tallyclip.sqlite");
    {
        let conn = tallyclip::db::open_at(&path).unwrap();
        add_customer(&conn, 1, 1);
    }
    let conn = tallyclip::db::open_at(&path).unwrap();
    assert!(store::get_customer(&conn, 1, 1).unwrap().is_some());
}
