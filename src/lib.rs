// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

pub mod alerts;
pub mod db;
pub mod error;
pub mod ledger;
pub mod models;
pub mod recalc;
pub mod status;
pub mod store;
pub mod validate;

pub use error::{Error, Result};
pub use models::{ALL_TENANTS, CustomerScope, MONEY_EPS};
