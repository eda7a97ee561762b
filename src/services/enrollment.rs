//! Enrollment lifecycle
//!
//! Registers and revokes reference descriptors. Re-enrolling replaces
//! the previous descriptor outright (people age, lighting rigs change),
//! and every action lands in the audit trail with the operator who
//! performed it. Validation happens here so no malformed descriptor
//! ever reaches a store.

use crate::domain::event::epoch_ms;
use crate::domain::types::{EmployeeId, EnrolledIdentity};
use crate::domain::EnrollError;
use crate::infra::{Config, Metrics};
use crate::io::audit::{AuditAction, AuditEntry, AuditSink};
use crate::io::enrollment::EnrollmentStore;
use std::sync::Arc;
use tracing::info;

pub struct EnrollmentManager {
    store: Arc<dyn EnrollmentStore>,
    audit: Arc<dyn AuditSink>,
    metrics: Arc<Metrics>,
    descriptor_len: usize,
}

impl EnrollmentManager {
    pub fn new(
        config: &Config,
        store: Arc<dyn EnrollmentStore>,
        audit: Arc<dyn AuditSink>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { store, audit, metrics, descriptor_len: config.descriptor_len() }
    }

    /// Enroll an employee, replacing any existing descriptor
    pub async fn enroll(
        &self,
        operator: &str,
        employee_id: EmployeeId,
        descriptor: Vec<f32>,
    ) -> Result<EnrolledIdentity, EnrollError> {
        if descriptor.len() != self.descriptor_len {
            return Err(EnrollError::WrongDimension {
                got: descriptor.len(),
                expected: self.descriptor_len,
            });
        }
        if descriptor.iter().all(|v| *v == 0.0) {
            return Err(EnrollError::ZeroMagnitude);
        }

        let replaced = self.store.fetch(&employee_id).await?.is_some();

        let identity = EnrolledIdentity {
            employee_id: employee_id.clone(),
            descriptor,
            enrolled_at: epoch_ms(),
        };
        self.store.store(&identity).await?;

        self.audit.append(&AuditEntry {
            at: identity.enrolled_at,
            actor: operator.to_string(),
            action: AuditAction::Enroll,
            employee_id: employee_id.clone(),
            metadata: serde_json::json!({
                "replaced": replaced,
                "dimension": self.descriptor_len,
            }),
        })?;

        self.metrics.record_enrollment();
        info!(
            employee_id = %employee_id,
            operator = %operator,
            replaced = %replaced,
            "employee_enrolled"
        );
        Ok(identity)
    }

    /// Revoke an enrollment; returns whether one existed
    pub async fn revoke(&self, operator: &str, employee_id: &EmployeeId) -> Result<bool, EnrollError> {
        let removed = self.store.clear(employee_id).await?;

        self.audit.append(&AuditEntry {
            at: epoch_ms(),
            actor: operator.to_string(),
            action: AuditAction::Revoke,
            employee_id: employee_id.clone(),
            metadata: serde_json::json!({ "removed": removed }),
        })?;

        self.metrics.record_revocation();
        info!(
            employee_id = %employee_id,
            operator = %operator,
            removed = %removed,
            "employee_revoked"
        );
        Ok(removed)
    }
}
