//! Function registry and fair-share rebalancing.
//!
//! The registry is plain data: it decides which quota every container should
//! run with and reports those decisions as [`QuotaWrite`]s. Applying them to
//! the container runtime, and locking, is the resolver's job.
//!
//! # Fair share
//!
//! With capacity `C = cores * period` and `D` the sum of every function's
//! desired quota, the fair-share factor is `λ = C / D`. While `λ >= 1` every
//! container runs at its desired quota. Once the node is oversubscribed each
//! container is scaled to `max(round(λ * desired), throttle_floor)`.
//!
//! `D` is never stored. After the first computation λ is updated from the
//! delta the caller supplies: `λ' = C / (C / λ + (new - old))`.

mod function;

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use seqclock_request::{Request, ResetRequest};
use serde::Serialize;

use crate::controller::{self, QuotaBounds, UNRESTRICTED_QUOTA};
use crate::error::ResolverError;

pub use function::{FunctionState, RequestsInfo};

/// A quota the resolver must write to a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaWrite {
    pub container_id: String,
    pub quota: i64,
}

impl QuotaWrite {
    fn new(container_id: impl Into<String>, quota: i64) -> Self {
        Self {
            container_id: container_id.into(),
            quota,
        }
    }
}

/// Serializable view of the registry for debugging.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrySnapshot {
    pub taken_at: DateTime<Utc>,
    pub cores: i64,
    pub capacity: i64,
    pub lambda: f64,
    pub functions: BTreeMap<String, FunctionState>,
}

/// All functions with at least one active demand on this node.
#[derive(Debug)]
pub struct Registry {
    functions: HashMap<String, FunctionState>,
    cores: i64,
    bounds: QuotaBounds,
    /// Last fair-share factor; `0` forces a full recompute.
    lambda_previous: f64,
}

impl Registry {
    pub fn new(cores: i64, bounds: QuotaBounds) -> Self {
        Self {
            functions: HashMap::new(),
            cores,
            bounds,
            lambda_previous: 0.0,
        }
    }

    pub fn bounds(&self) -> &QuotaBounds {
        &self.bounds
    }

    pub fn capacity(&self) -> i64 {
        controller::capacity(self.cores)
    }

    /// Current fair-share factor (`0` when nothing is tracked).
    pub fn lambda(&self) -> f64 {
        self.lambda_previous
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn contains(&self, function: &str) -> bool {
        self.functions.contains_key(function)
    }

    pub fn get(&self, function: &str) -> Option<&FunctionState> {
        self.functions.get(function)
    }

    /// Start tracking a function whose container was just located.
    pub fn track(&mut self, function: impl Into<String>, container_id: impl Into<String>) {
        self.functions
            .entry(function.into())
            .or_insert_with(|| FunctionState::new(container_id));
    }

    /// Admit a demand for an already tracked function.
    ///
    /// A demand above the current primary's quota takes over as primary and
    /// the previous primary is demoted to pending. Anything else is remembered
    /// as pending without being granted.
    pub fn update(&mut self, request: &Request) -> Result<Vec<QuotaWrite>, ResolverError> {
        let desired = controller::desired_quota(&request.metrics, self.cores, &self.bounds);
        let state = self
            .functions
            .get_mut(&request.function)
            .ok_or_else(|| ResolverError::FunctionNotFound(request.function.clone()))?;

        let mut writes = Vec::new();
        if desired > state.desired_quotas {
            let quotas_old = state.desired_quotas;
            state.promote(request.id, desired);
            writes.push(QuotaWrite::new(state.container_id.clone(), desired));
            self.reconfigure_into(desired, quotas_old, &mut writes);
        } else if request.id != state.requests.current_id {
            state.requests.active.insert(request.id, desired);
        }

        Ok(coalesce(writes))
    }

    /// Release a demand.
    ///
    /// Releasing the primary promotes the best pending demand, or drops the
    /// function entirely (restriction lifted) when nothing is pending.
    pub fn remove(&mut self, reset: &ResetRequest) -> Result<Vec<QuotaWrite>, ResolverError> {
        let state = self
            .functions
            .get_mut(&reset.function)
            .ok_or_else(|| ResolverError::FunctionNotFound(reset.function.clone()))?;

        let mut writes = Vec::new();
        if state.requests.current_id == reset.id {
            let quotas_old = state.desired_quotas;
            if state.promote_next() {
                let quotas_new = state.desired_quotas;
                writes.push(QuotaWrite::new(state.container_id.clone(), quotas_new));
                self.reconfigure_into(quotas_new, quotas_old, &mut writes);
            } else {
                let container_id = state.container_id.clone();
                self.functions.remove(&reset.function);
                writes.push(QuotaWrite::new(container_id, UNRESTRICTED_QUOTA));
                if self.functions.is_empty() {
                    self.lambda_previous = 0.0;
                } else {
                    self.reconfigure_into(0, quotas_old, &mut writes);
                }
            }
        } else if state.requests.active.remove(&reset.id).is_none() {
            return Err(ResolverError::RequestNotFound {
                id: reset.id,
                function: reset.function.clone(),
            });
        }

        Ok(coalesce(writes))
    }

    /// Rebalance after the primary of one function moved from `quotas_old`
    /// to `quotas_new`.
    pub fn reconfigure(&mut self, quotas_new: i64, quotas_old: i64) -> Vec<QuotaWrite> {
        let mut writes = Vec::new();
        self.reconfigure_into(quotas_new, quotas_old, &mut writes);
        coalesce(writes)
    }

    fn reconfigure_into(&mut self, quotas_new: i64, quotas_old: i64, writes: &mut Vec<QuotaWrite>) {
        let capacity = self.capacity() as f64;
        let lambda = match self.incremental_lambda(capacity, quotas_new - quotas_old) {
            Some(lambda) => lambda,
            None => {
                let sum: i64 = self.functions.values().map(|s| s.desired_quotas).sum();
                if sum <= 0 {
                    self.lambda_previous = 0.0;
                    return;
                }
                capacity / sum as f64
            }
        };

        if !(self.lambda_previous >= 1.0 && lambda >= 1.0) {
            for state in self.functions.values_mut() {
                state.quotas = if lambda < 1.0 {
                    self.bounds
                        .throttle((lambda * state.desired_quotas as f64).round() as i64)
                } else {
                    state.desired_quotas
                };
                writes.push(QuotaWrite::new(state.container_id.clone(), state.quotas));
            }
        }
        self.lambda_previous = lambda;
    }

    /// Warm-path λ, or `None` when a full recompute is required.
    fn incremental_lambda(&self, capacity: f64, delta: i64) -> Option<f64> {
        if self.lambda_previous == 0.0 {
            return None;
        }
        let sum = capacity / self.lambda_previous + delta as f64;
        (sum > 0.0).then(|| capacity / sum)
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            taken_at: Utc::now(),
            cores: self.cores,
            capacity: self.capacity(),
            lambda: self.lambda_previous,
            functions: self
                .functions
                .iter()
                .map(|(name, state)| (name.clone(), state.clone()))
                .collect(),
        }
    }
}

/// Keep only the last write per container, in decision order.
fn coalesce(writes: Vec<QuotaWrite>) -> Vec<QuotaWrite> {
    let mut seen = HashSet::new();
    let mut kept: Vec<QuotaWrite> = writes
        .into_iter()
        .rev()
        .filter(|w| seen.insert(w.container_id.clone()))
        .collect();
    kept.reverse();
    kept
}
