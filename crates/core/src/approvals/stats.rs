use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::approval::ApprovalRequest;
use crate::domain::employee::EmployeeId;

/// Dashboard counters for one approver.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproverStats {
    pub approver_id: EmployeeId,
    pub total_pending: u64,
    pub pending_by_type: BTreeMap<String, u64>,
}

impl ApproverStats {
    /// Counts rows that are still pending and assigned to `approver_id`; others are ignored.
    pub fn from_rows<'a>(
        approver_id: &EmployeeId,
        rows: impl IntoIterator<Item = &'a ApprovalRequest>,
    ) -> Self {
        let mut pending_by_type = BTreeMap::new();
        let mut total_pending = 0;

        for row in rows {
            if !row.is_pending() || &row.approver_id != approver_id {
                continue;
            }
            total_pending += 1;
            *pending_by_type.entry(row.request_type.as_str().to_string()).or_insert(0) += 1;
        }

        Self { approver_id: approver_id.clone(), total_pending, pending_by_type }
    }

    pub fn pending_for(&self, request_type: &str) -> u64 {
        self.pending_by_type.get(request_type).copied().unwrap_or(0)
    }
}
