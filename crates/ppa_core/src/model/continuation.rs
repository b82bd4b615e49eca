//! Continuation preconditions shared by the aggregate and the workflow.

use crate::model::error::{DomainError, DomainResult};
use crate::model::ppa::{Ppa, PpaStatus};

/// Checks that `source` may be continued into a later period.
///
/// # Errors
/// - `AlreadyContinued` when a successor is already linked.
/// - `NotContinuable` unless the status is `Completed` or `Archived`.
pub fn check_continuation_source(source: &Ppa) -> DomainResult<()> {
    if let Some(continued_by) = source.continued_by_ppa_id() {
        return Err(DomainError::AlreadyContinued {
            ppa_id: source.id(),
            continued_by,
        });
    }

    match source.status() {
        PpaStatus::Completed | PpaStatus::Archived => Ok(()),
        status => Err(DomainError::NotContinuable {
            ppa_id: source.id(),
            status,
        }),
    }
}

/// Returns whether `source` passes `check_continuation_source`.
pub fn can_be_continued(source: &Ppa) -> bool {
    check_continuation_source(source).is_ok()
}

#[cfg(test)]
mod tests {
    use super::{can_be_continued, check_continuation_source};
    use crate::model::error::DomainError;
    use crate::model::ppa::{Ppa, PpaDraft, PpaStatus};
    use uuid::Uuid;

    fn ppa_in(status: PpaStatus) -> Ppa {
        let (mut ppa, _) =
            Ppa::create(PpaDraft::new("Robotics Lab", Uuid::new_v4(), Uuid::new_v4())).unwrap();
        if status != PpaStatus::Proposal {
            ppa.change_status(status).unwrap();
        }
        ppa
    }

    #[test]
    fn only_completed_or_archived_sources_qualify() {
        assert!(!can_be_continued(&ppa_in(PpaStatus::Proposal)));
        assert!(!can_be_continued(&ppa_in(PpaStatus::InProgress)));
        assert!(can_be_continued(&ppa_in(PpaStatus::Completed)));
        assert!(can_be_continued(&ppa_in(PpaStatus::Archived)));
    }

    #[test]
    fn continued_sources_are_rejected() {
        let mut source = ppa_in(PpaStatus::Archived);
        source.mark_continued_by(Uuid::new_v4()).unwrap();

        let err = check_continuation_source(&source).unwrap_err();
        assert!(matches!(err, DomainError::AlreadyContinued { .. }));
    }
}
