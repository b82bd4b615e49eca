//! PPA use-case service.
//!
//! # Responsibility
//! - Create, read, list and edit PPA records.
//! - Gate completion on the configured document policy.
//!
//! # Invariants
//! - Every effective mutation is saved together with its history entries.
//! - A mutation that changes nothing writes nothing.
//! - Aggregate validation runs before reference-data lookups, so malformed
//!   input is reported as a validation error.
//! - One active PPA per {assignment set, period} is enforced by the
//!   repository inside the write transaction.
//!
//! # See also
//! - `service::continuation` for the cross-period workflow.

use crate::collab::ReferenceData;
use crate::config::CompletionPolicy;
use crate::model::error::DomainResult;
use crate::model::history::PpaHistoryEntry;
use crate::model::ppa::{Ppa, PpaChange, PpaDraft, PpaId, PpaStatus, TeacherAssignmentId, UserId};
use crate::repo::attachment_repo::AttachmentRepository;
use crate::repo::history_repo::HistoryRepository;
use crate::repo::ppa_repo::{PpaListQuery, PpaPage, PpaRepository};
use crate::service::{
    check_assignments, check_period, history_for, log_outcome, PpaServiceError, ServiceResult,
};
use log::info;

/// PPA service facade over repository and reference-data implementations.
pub struct PpaService<R, A, H, D>
where
    R: PpaRepository,
    A: AttachmentRepository,
    H: HistoryRepository,
    D: ReferenceData,
{
    ppas: R,
    attachments: A,
    history: H,
    reference: D,
    policy: CompletionPolicy,
}

impl<R, A, H, D> PpaService<R, A, H, D>
where
    R: PpaRepository,
    A: AttachmentRepository,
    H: HistoryRepository,
    D: ReferenceData,
{
    /// Creates a service with the default completion policy.
    pub fn new(ppas: R, attachments: A, history: H, reference: D) -> Self {
        Self {
            ppas,
            attachments,
            history,
            reference,
            policy: CompletionPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: CompletionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Creates a PPA in `Proposal` status.
    ///
    /// # Errors
    /// - `PeriodNotFound` / `PeriodInactive` for the target period.
    /// - `AssignmentNotFound` / `AssignmentInactive` for linked assignments.
    /// - `AssignmentSetOccupied` when an active PPA already holds the same
    ///   non-empty assignment set in the period.
    /// - Domain validation errors from `Ppa::create`, reported before any
    ///   reference-data lookup.
    pub fn create_ppa(&self, draft: PpaDraft, actor_id: UserId) -> ServiceResult<Ppa> {
        let period = draft.academic_period_id;
        let result = self.create_ppa_inner(draft, actor_id);
        match &result {
            Ok(ppa) => log_outcome("ppa_create", ppa.id(), &result),
            Err(_) => log_outcome("ppa_create", format_args!("period:{period}"), &result),
        }
        result
    }

    fn create_ppa_inner(&self, draft: PpaDraft, actor_id: UserId) -> ServiceResult<Ppa> {
        let (ppa, changes) = Ppa::create(draft)?;
        check_period(&self.reference, ppa.academic_period_id(), true)?;
        check_assignments(&self.reference, ppa.teacher_assignment_ids())?;

        let history = history_for(&ppa, actor_id, &changes)?;
        self.ppas.insert_ppa(&ppa, &history)?;
        Ok(ppa)
    }

    pub fn get_ppa(&self, id: PpaId) -> ServiceResult<Ppa> {
        self.ppas
            .get_ppa(id)?
            .ok_or(PpaServiceError::PpaNotFound(id))
    }

    pub fn list_ppas(&self, query: &PpaListQuery) -> ServiceResult<PpaPage> {
        Ok(self.ppas.list_ppas(query)?)
    }

    /// Audit entries for one PPA, newest first.
    pub fn history(&self, id: PpaId) -> ServiceResult<Vec<PpaHistoryEntry>> {
        if self.ppas.get_ppa(id)?.is_none() {
            return Err(PpaServiceError::PpaNotFound(id));
        }
        Ok(self.history.list_for_ppa(id)?)
    }

    pub fn update_title(&self, id: PpaId, title: &str, actor_id: UserId) -> ServiceResult<Ppa> {
        self.mutate("ppa_update_title", id, actor_id, |ppa| ppa.update_title(title))
    }

    pub fn update_general_objective(
        &self,
        id: PpaId,
        value: Option<&str>,
        actor_id: UserId,
    ) -> ServiceResult<Ppa> {
        self.mutate("ppa_update_general_objective", id, actor_id, |ppa| {
            ppa.update_general_objective(value)
        })
    }

    pub fn update_specific_objectives(
        &self,
        id: PpaId,
        value: Option<&str>,
        actor_id: UserId,
    ) -> ServiceResult<Ppa> {
        self.mutate("ppa_update_specific_objectives", id, actor_id, |ppa| {
            ppa.update_specific_objectives(value)
        })
    }

    pub fn update_description(
        &self,
        id: PpaId,
        value: Option<&str>,
        actor_id: UserId,
    ) -> ServiceResult<Ppa> {
        self.mutate("ppa_update_description", id, actor_id, |ppa| {
            ppa.update_description(value)
        })
    }

    pub fn change_primary_teacher(
        &self,
        id: PpaId,
        teacher_id: UserId,
        actor_id: UserId,
    ) -> ServiceResult<Ppa> {
        self.mutate("ppa_change_teacher", id, actor_id, |ppa| {
            ppa.change_primary_teacher(teacher_id)
        })
    }

    pub fn set_students<S: AsRef<str>>(
        &self,
        id: PpaId,
        names: &[S],
        actor_id: UserId,
    ) -> ServiceResult<Ppa> {
        self.mutate("ppa_set_students", id, actor_id, |ppa| ppa.set_students(names))
    }

    /// Changes the life-cycle status.
    ///
    /// Moving into `Completed` requires the completion policy to hold: at
    /// least `min_documents` live `Document` attachments.
    ///
    /// # Errors
    /// - `TerminalState` when the PPA is archived or continued.
    /// - Validation error for `InContinuing`.
    /// - `MissingRequiredDocuments` when the completion policy fails.
    pub fn change_status(
        &self,
        id: PpaId,
        status: PpaStatus,
        actor_id: UserId,
    ) -> ServiceResult<Ppa> {
        let result = self.change_status_inner(id, status, actor_id);
        if result.is_ok() {
            info!(
                "event=ppa_change_status module=service status=ok id={id} to={}",
                status.as_str()
            );
        } else {
            log_outcome("ppa_change_status", id, &result);
        }
        result
    }

    fn change_status_inner(
        &self,
        id: PpaId,
        status: PpaStatus,
        actor_id: UserId,
    ) -> ServiceResult<Ppa> {
        let mut ppa = self.load(id)?;
        let Some(change) = ppa.change_status(status)? else {
            return Ok(ppa);
        };

        if status == PpaStatus::Completed {
            let found =
                self.attachments
                    .count_by_type(id, self.policy.required_type(), false)?;
            if !self.policy.is_satisfied_by(found) {
                return Err(PpaServiceError::MissingRequiredDocuments {
                    ppa_id: id,
                    required: self.policy.min_documents,
                    found,
                });
            }
        }

        self.save(&mut ppa, actor_id, &[change])?;
        Ok(ppa)
    }

    /// Links one teacher assignment.
    ///
    /// # Errors
    /// - `TerminalState` when the PPA is archived or continued.
    /// - `NilId` validation error for a nil assignment id.
    /// - Duplicate association when the assignment is already linked.
    /// - `AssignmentNotFound` / `AssignmentInactive` from reference data.
    /// - `AssignmentSetOccupied` when the resulting set collides with another
    ///   active PPA in the same period.
    pub fn attach_teacher_assignment(
        &self,
        id: PpaId,
        assignment_id: TeacherAssignmentId,
        actor_id: UserId,
    ) -> ServiceResult<Ppa> {
        let result = (|| -> ServiceResult<Ppa> {
            let mut ppa = self.load(id)?;
            let change = ppa.attach_teacher_assignment(assignment_id)?;
            check_assignments(&self.reference, [&assignment_id])?;
            self.save(&mut ppa, actor_id, &[change])?;
            Ok(ppa)
        })();
        log_outcome("ppa_attach_assignment", id, &result);
        result
    }

    /// Unlinks one teacher assignment; unlinked ids are a no-op.
    ///
    /// # Errors
    /// - `AssignmentSetOccupied` when the remaining set collides with another
    ///   active PPA in the same period.
    pub fn remove_teacher_assignment(
        &self,
        id: PpaId,
        assignment_id: TeacherAssignmentId,
        actor_id: UserId,
    ) -> ServiceResult<Ppa> {
        let result = (|| -> ServiceResult<Ppa> {
            let mut ppa = self.load(id)?;
            let Some(change) = ppa.remove_teacher_assignment(assignment_id)? else {
                return Ok(ppa);
            };
            self.save(&mut ppa, actor_id, &[change])?;
            Ok(ppa)
        })();
        log_outcome("ppa_remove_assignment", id, &result);
        result
    }

    fn mutate(
        &self,
        event: &str,
        id: PpaId,
        actor_id: UserId,
        apply: impl FnOnce(&mut Ppa) -> DomainResult<Option<PpaChange>>,
    ) -> ServiceResult<Ppa> {
        let result = (|| -> ServiceResult<(Ppa, bool)> {
            let mut ppa = self.load(id)?;
            match apply(&mut ppa)? {
                Some(change) => {
                    self.save(&mut ppa, actor_id, &[change])?;
                    Ok((ppa, true))
                }
                None => Ok((ppa, false)),
            }
        })();

        match &result {
            Ok((_, false)) => info!("event={event} module=service status=noop id={id}"),
            Ok((_, true)) => info!("event={event} module=service status=ok id={id}"),
            Err(_) => log_outcome(event, id, &result),
        }
        result.map(|(ppa, _)| ppa)
    }

    fn load(&self, id: PpaId) -> ServiceResult<Ppa> {
        self.ppas
            .get_ppa(id)?
            .ok_or(PpaServiceError::PpaNotFound(id))
    }

    fn save(&self, ppa: &mut Ppa, actor_id: UserId, changes: &[PpaChange]) -> ServiceResult<()> {
        let history = history_for(ppa, actor_id, changes)?;
        let version = self.ppas.update_ppa(ppa, &history)?;
        ppa.mark_persisted(version);
        Ok(())
    }
}
