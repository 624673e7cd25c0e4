//! Per-function bookkeeping of active demands.

use std::collections::HashMap;

use serde::Serialize;

/// Requests known for one function.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RequestsInfo {
    /// ID of the primary (granted) request.
    pub current_id: u64,

    /// Pending non-primary demands: request ID to desired quota.
    pub active: HashMap<u64, i64>,
}

/// State of one function's container on this node.
#[derive(Debug, Clone, Serialize)]
pub struct FunctionState {
    pub container_id: String,

    /// Last quota written to the container.
    pub quotas: i64,

    /// Desired quota of the primary request.
    pub desired_quotas: i64,

    pub requests: RequestsInfo,
}

impl FunctionState {
    pub fn new(container_id: impl Into<String>) -> Self {
        Self {
            container_id: container_id.into(),
            quotas: 0,
            desired_quotas: 0,
            requests: RequestsInfo::default(),
        }
    }

    /// Pending demand that should be promoted next.
    ///
    /// Largest quota wins; equal quotas go to the smallest ID.
    pub fn next_request(&self) -> Option<(u64, i64)> {
        self.requests
            .active
            .iter()
            .map(|(&id, &quota)| (id, quota))
            .max_by(|(a_id, a_quota), (b_id, b_quota)| {
                a_quota.cmp(b_quota).then_with(|| b_id.cmp(a_id))
            })
    }

    /// Make `id` the primary request, demoting the current primary if any.
    pub(crate) fn promote(&mut self, id: u64, desired: i64) {
        if self.desired_quotas != 0 {
            self.requests
                .active
                .insert(self.requests.current_id, self.desired_quotas);
        }
        self.requests.active.remove(&id);
        self.requests.current_id = id;
        self.desired_quotas = desired;
        self.quotas = desired;
    }

    /// Promote the next pending demand after the primary was released.
    ///
    /// Returns false when nothing is pending.
    pub(crate) fn promote_next(&mut self) -> bool {
        match self.next_request() {
            Some((id, quota)) => {
                self.requests.active.remove(&id);
                self.requests.current_id = id;
                self.desired_quotas = quota;
                self.quotas = quota;
                true
            }
            None => false,
        }
    }
}
