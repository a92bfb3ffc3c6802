// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::{Error, Result};
use directories::ProjectDirs;
use once_cell::sync::Lazy;
use rusqlite::Connection;
use std::fs;
use std::path::PathBuf;

static APP: Lazy<(&str, &str, &str)> =
    Lazy::new(|| ("com.alphavelocity", "Tallyclip", "tallyclip"));

pub fn db_path() -> Result<PathBuf> {
    let proj = ProjectDirs::from(APP.0, APP.1, APP.2).ok_or(Error::DataDir)?;
    let data_dir = proj.data_dir();
    fs::create_dir_all(data_dir)?;
    Ok(data_dir.join("tallyclip.sqlite"))
}

pub fn open_or_init() -> Result<Connection> {
    let path = db_path()?;
    open_at(&path)
}

pub fn open_at(path: &std::path::Path) -> Result<Connection> {
    let mut conn = Connection::open(path)?;
    init_schema(&mut conn)?;
    Ok(conn)
}

/// Schema-initialized in-memory database, for embedding and tests.
pub fn open_in_memory() -> Result<Connection> {
    let mut conn = Connection::open_in_memory()?;
    init_schema(&mut conn)?;
    Ok(conn)
}

fn init_schema(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        r#"
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS customers(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        tenant_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        total_sales TEXT NOT NULL DEFAULT '0',
        total_payments TEXT NOT NULL DEFAULT '0',
        total_returns TEXT NOT NULL DEFAULT '0',
        pending_balance TEXT NOT NULL DEFAULT '0',
        credit_limit TEXT NOT NULL DEFAULT '0',
        last_payment_date TEXT,
        last_activity TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_customers_tenant ON customers(tenant_id);

    -- customer_id NULL = walk-in cash sale, not a dangling reference
    CREATE TABLE IF NOT EXISTS invoices(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        tenant_id INTEGER NOT NULL,
        customer_id INTEGER,
        invoice_no TEXT NOT NULL,
        grand_total TEXT NOT NULL,
        paid_amount TEXT NOT NULL DEFAULT '0',
        payment_status TEXT NOT NULL DEFAULT 'pending'
            CHECK(payment_status IN ('pending','partial','paid')),
        invoice_date TEXT NOT NULL,
        due_date TEXT,
        branch_id INTEGER,
        route_id INTEGER,
        created_by INTEGER,
        is_deleted INTEGER NOT NULL DEFAULT 0,
        FOREIGN KEY(customer_id) REFERENCES customers(id) ON DELETE SET NULL
    );
    CREATE INDEX IF NOT EXISTS idx_invoices_customer ON invoices(tenant_id, customer_id, invoice_date);

    CREATE TABLE IF NOT EXISTS payments(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        tenant_id INTEGER NOT NULL,
        customer_id INTEGER,
        sale_id INTEGER,
        amount TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'cleared'
            CHECK(status IN ('pending','cleared','void')),
        mode TEXT NOT NULL DEFAULT 'cash'
            CHECK(mode IN ('cash','cheque','online','credit')),
        payment_date TEXT NOT NULL,
        reference TEXT,
        FOREIGN KEY(customer_id) REFERENCES customers(id) ON DELETE SET NULL,
        FOREIGN KEY(sale_id) REFERENCES invoices(id) ON DELETE SET NULL
    );
    CREATE INDEX IF NOT EXISTS idx_payments_customer ON payments(tenant_id, customer_id, payment_date);
    CREATE INDEX IF NOT EXISTS idx_payments_sale ON payments(sale_id);

    CREATE TABLE IF NOT EXISTS returns(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        tenant_id INTEGER NOT NULL,
        customer_id INTEGER,
        return_no TEXT NOT NULL,
        grand_total TEXT NOT NULL,
        return_date TEXT NOT NULL,
        FOREIGN KEY(customer_id) REFERENCES customers(id) ON DELETE SET NULL
    );
    CREATE INDEX IF NOT EXISTS idx_returns_customer ON returns(tenant_id, customer_id, return_date);
    "#,
    )?;
    Ok(())
}
