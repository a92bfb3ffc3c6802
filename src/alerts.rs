// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub kind: String,
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub metadata: serde_json::Value,
    pub tenant_id: i64,
}

/// Fire-and-forget notification seam. The engine never awaits or retries a
/// sink; a sink that can fail must swallow its own failures.
pub trait AlertSink {
    fn notify(&self, alert: Alert);
}

/// Routes alerts into the tracing output at a level matching their severity.
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn notify(&self, alert: Alert) {
        match alert.severity {
            Severity::Info => info!(
                kind = %alert.kind,
                tenant_id = alert.tenant_id,
                "{}: {}", alert.title, alert.message
            ),
            Severity::Warning => warn!(
                kind = %alert.kind,
                tenant_id = alert.tenant_id,
                "{}: {}", alert.title, alert.message
            ),
            Severity::Critical => error!(
                kind = %alert.kind,
                tenant_id = alert.tenant_id,
                "{}: {}", alert.title, alert.message
            ),
        }
    }
}

pub struct NullAlertSink;

impl AlertSink for NullAlertSink {
    fn notify(&self, _alert: Alert) {}
}
