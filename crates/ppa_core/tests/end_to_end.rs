mod common;

use common::{ppa_service, InMemoryStorage, World};
use ppa_core::db::open_db_in_memory;
use ppa_core::{
    AttachmentService, AttachmentType, AttachmentUpload, ContinuationRequest,
    ContinuationService, HistoryAction, PpaDraft, PpaHistoryEntry, PpaStatus,
    SqliteAttachmentRepository, SqlitePpaRepository,
};

#[test]
fn ppa_is_created_documented_completed_and_continued() {
    let world = World::new();
    let conn = open_db_in_memory().unwrap();
    let reference = world.reference();
    let storage = InMemoryStorage::default();
    let ppas = ppa_service(&conn, &reference);
    let attachments = AttachmentService::new(
        SqlitePpaRepository::try_new(&conn).unwrap(),
        SqliteAttachmentRepository::try_new(&conn).unwrap(),
        &storage,
    );
    let continuation =
        ContinuationService::new(SqlitePpaRepository::try_new(&conn).unwrap(), &reference);

    let ppa = ppas
        .create_ppa(
            PpaDraft::new("Robotics Lab", world.period, world.teacher),
            world.actor,
        )
        .unwrap();
    ppas.attach_teacher_assignment(ppa.id(), world.assignment, world.actor)
        .unwrap();
    attachments
        .upload_attachment(
            AttachmentUpload {
                ppa_id: ppa.id(),
                kind: AttachmentType::Document,
                file_name: "final-report.pdf",
                content_type: Some("application/pdf"),
                bytes: b"%PDF-1.7 report",
            },
            world.actor,
        )
        .unwrap();
    let completed = ppas
        .change_status(ppa.id(), PpaStatus::Completed, world.actor)
        .unwrap();
    assert_eq!(completed.status(), PpaStatus::Completed);

    let outcome = continuation
        .continue_ppa(
            ContinuationRequest::new(ppa.id(), world.next_period),
            world.actor,
        )
        .unwrap();

    let source = ppas.get_ppa(ppa.id()).unwrap();
    let target = ppas.get_ppa(outcome.target.id()).unwrap();
    assert_eq!(source.status(), PpaStatus::InContinuing);
    assert_eq!(source.continued_by_ppa_id(), Some(target.id()));
    assert_eq!(target.continuation_of_ppa_id(), Some(source.id()));
    assert_eq!(target.status(), PpaStatus::Proposal);
    assert_eq!(target.academic_period_id(), world.next_period);
    assert!(target.teacher_assignment_ids().contains(&world.assignment));

    let source_actions: Vec<HistoryAction> = ppas
        .history(source.id())
        .unwrap()
        .iter()
        .map(PpaHistoryEntry::action)
        .collect();
    assert_eq!(
        source_actions,
        vec![
            HistoryAction::ContinuationCreated,
            HistoryAction::ChangedStatus,
            HistoryAction::AttachmentAdded,
            HistoryAction::UpdatedAssignments,
            HistoryAction::Created,
        ]
    );

    let target_history = ppas.history(target.id()).unwrap();
    let target_actions: Vec<HistoryAction> =
        target_history.iter().map(PpaHistoryEntry::action).collect();
    assert!(target_actions.contains(&HistoryAction::Created));
    assert!(target_actions.contains(&HistoryAction::UpdatedContinuationSettings));
    assert!(target_history
        .iter()
        .all(|entry| entry.actor_id() == world.actor));

    // The frozen source accepts no further edits.
    assert!(ppas
        .update_title(source.id(), "Robotics Lab (late edit)", world.actor)
        .is_err());
}
