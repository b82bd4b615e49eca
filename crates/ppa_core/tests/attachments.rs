mod common;

use common::{count_rows, ppa_service, InMemoryStorage, World};
use ppa_core::db::open_db_in_memory;
use ppa_core::{
    AttachmentRepository, AttachmentService, AttachmentType, AttachmentUpload, ErrorKind,
    HistoryAction, Ppa, PpaDraft, PpaServiceError, PpaStatus, RepoError,
    SqliteAttachmentRepository, SqlitePpaRepository,
};
use rusqlite::Connection;
use uuid::Uuid;

type SqliteAttachmentService<'a> = AttachmentService<
    SqlitePpaRepository<'a>,
    SqliteAttachmentRepository<'a>,
    &'a InMemoryStorage,
>;

fn attachment_service<'a>(
    conn: &'a Connection,
    storage: &'a InMemoryStorage,
) -> SqliteAttachmentService<'a> {
    AttachmentService::new(
        SqlitePpaRepository::try_new(conn).unwrap(),
        SqliteAttachmentRepository::try_new(conn).unwrap(),
        storage,
    )
}

fn document(ppa: &Ppa, file_name: &'static str) -> AttachmentUpload<'static> {
    AttachmentUpload {
        ppa_id: ppa.id(),
        kind: AttachmentType::Document,
        file_name,
        content_type: Some("application/pdf"),
        bytes: b"%PDF-1.7",
    }
}

fn create_ppa(conn: &Connection, world: &World) -> Ppa {
    let reference = world.reference();
    ppa_service(conn, &reference)
        .create_ppa(
            PpaDraft::new("Robotics Lab", world.period, world.teacher),
            world.actor,
        )
        .unwrap()
}

#[test]
fn upload_stores_bytes_and_records_history() {
    let world = World::new();
    let conn = open_db_in_memory().unwrap();
    let storage = InMemoryStorage::default();
    let ppa = create_ppa(&conn, &world);
    let service = attachment_service(&conn, &storage);

    let attachment = service
        .upload_attachment(document(&ppa, " final.pdf "), world.actor)
        .unwrap();
    assert_eq!(attachment.name, "final.pdf");
    assert!(attachment.file_key.starts_with("ppa/documents/"));
    assert!(storage.contains(&attachment.file_key));

    let (meta, bytes) = service.download_attachment(attachment.id).unwrap();
    assert_eq!(meta, attachment);
    assert_eq!(bytes, b"%PDF-1.7");
    assert_eq!(
        service
            .count_by_type(ppa.id(), AttachmentType::Document, false)
            .unwrap(),
        1
    );

    let reference = world.reference();
    let history = ppa_service(&conn, &reference).history(ppa.id()).unwrap();
    assert_eq!(history[0].action(), HistoryAction::AttachmentAdded);
}

#[test]
fn duplicate_file_key_is_rejected_and_upload_is_rolled_back() {
    let world = World::new();
    let conn = open_db_in_memory().unwrap();
    let storage = InMemoryStorage::default();
    let ppa = create_ppa(&conn, &world);
    let other = {
        let reference = world.reference();
        ppa_service(&conn, &reference)
            .create_ppa(
                PpaDraft::new("Chemistry", world.period, world.teacher),
                world.actor,
            )
            .unwrap()
    };
    let service = attachment_service(&conn, &storage);

    service
        .register_attachment(
            ppa.id(),
            AttachmentType::Evidence,
            "photo.png",
            "shared/key.png",
            None,
            world.actor,
        )
        .unwrap();

    // Keys are unique across PPAs, not only within one.
    let err = service
        .register_attachment(
            other.id(),
            AttachmentType::Evidence,
            "photo.png",
            "shared/key.png",
            None,
            world.actor,
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Duplicate);

    let uploaded = service
        .upload_attachment(document(&ppa, "a.pdf"), world.actor)
        .unwrap();
    storage.force_next_key(&uploaded.file_key);
    let err = service
        .upload_attachment(document(&other, "b.pdf"), world.actor)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Duplicate);
    assert!(!storage.contains(&uploaded.file_key));
    assert_eq!(count_rows(&conn, "ppa_attachments"), 2);
}

#[test]
fn taken_file_keys_are_rejected_before_insert() {
    let world = World::new();
    let conn = open_db_in_memory().unwrap();
    let storage = InMemoryStorage::default();
    let ppa = create_ppa(&conn, &world);
    let service = attachment_service(&conn, &storage);
    let repo = SqliteAttachmentRepository::try_new(&conn).unwrap();

    assert!(!repo.file_key_exists("reports/final.pdf").unwrap());
    let first = service
        .register_attachment(
            ppa.id(),
            AttachmentType::Document,
            "final.pdf",
            "reports/final.pdf",
            None,
            world.actor,
        )
        .unwrap();
    assert!(repo.file_key_exists("reports/final.pdf").unwrap());
    assert!(!repo.file_key_exists("reports/draft.pdf").unwrap());

    // Removed rows keep their key reserved.
    assert!(service.remove_attachment(first.id, world.actor).unwrap());
    let history_rows = count_rows(&conn, "ppa_history");

    let err = service
        .register_attachment(
            ppa.id(),
            AttachmentType::Document,
            "final-v2.pdf",
            "  reports/final.pdf ",
            None,
            world.actor,
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Duplicate);
    assert!(matches!(
        err,
        PpaServiceError::Repo(RepoError::Duplicate { ref key, .. }) if key == "reports/final.pdf"
    ));
    assert_eq!(count_rows(&conn, "ppa_attachments"), 1);
    assert_eq!(count_rows(&conn, "ppa_history"), history_rows);
}

#[test]
fn storage_failure_propagates_without_registration() {
    let world = World::new();
    let conn = open_db_in_memory().unwrap();
    let storage = InMemoryStorage::default();
    storage.fail_uploads();
    let ppa = create_ppa(&conn, &world);
    let service = attachment_service(&conn, &storage);

    let err = service
        .upload_attachment(document(&ppa, "final.pdf"), world.actor)
        .unwrap_err();
    assert!(matches!(err, PpaServiceError::Storage(_)));
    assert_eq!(err.kind(), ErrorKind::Storage);
    assert_eq!(count_rows(&conn, "ppa_attachments"), 0);
}

#[test]
fn remove_is_soft_and_idempotent() {
    let world = World::new();
    let conn = open_db_in_memory().unwrap();
    let storage = InMemoryStorage::default();
    let ppa = create_ppa(&conn, &world);
    let service = attachment_service(&conn, &storage);

    let kept = service
        .upload_attachment(document(&ppa, "kept.pdf"), world.actor)
        .unwrap();
    let removed = service
        .upload_attachment(document(&ppa, "removed.pdf"), world.actor)
        .unwrap();

    assert!(service.remove_attachment(removed.id, world.actor).unwrap());
    assert!(!service.remove_attachment(removed.id, world.actor).unwrap());

    assert_eq!(
        service
            .count_by_type(ppa.id(), AttachmentType::Document, false)
            .unwrap(),
        1
    );
    assert_eq!(
        service
            .count_by_type(ppa.id(), AttachmentType::Document, true)
            .unwrap(),
        2
    );
    let live = service.list_attachments(ppa.id(), false).unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].id, kept.id);
    let all = service.list_attachments(ppa.id(), true).unwrap();
    let stored = all.iter().find(|row| row.id == removed.id).unwrap();
    assert!(stored.is_deleted);
    assert!(stored.deleted_at.is_some());

    // Bytes stay until purged.
    assert!(storage.contains(&removed.file_key));
    assert_eq!(
        service.download_attachment(removed.id).unwrap_err().kind(),
        ErrorKind::NotFound
    );

    let reference = world.reference();
    let removals = ppa_service(&conn, &reference)
        .history(ppa.id())
        .unwrap()
        .into_iter()
        .filter(|entry| entry.action() == HistoryAction::AttachmentRemoved)
        .count();
    assert_eq!(removals, 1);
}

#[test]
fn purge_only_applies_to_removed_attachments() {
    let world = World::new();
    let conn = open_db_in_memory().unwrap();
    let storage = InMemoryStorage::default();
    let ppa = create_ppa(&conn, &world);
    let service = attachment_service(&conn, &storage);

    let attachment = service
        .upload_attachment(document(&ppa, "final.pdf"), world.actor)
        .unwrap();
    let err = service.purge_attachment_file(attachment.id).unwrap_err();
    assert!(matches!(err, PpaServiceError::AttachmentNotRemoved(_)));
    assert!(storage.contains(&attachment.file_key));

    service.remove_attachment(attachment.id, world.actor).unwrap();
    service.purge_attachment_file(attachment.id).unwrap();
    assert!(!storage.contains(&attachment.file_key));
    service.purge_attachment_file(attachment.id).unwrap();
    assert_eq!(storage.file_count(), 0);
}

#[test]
fn terminal_ppa_rejects_attachment_changes() {
    let world = World::new();
    let conn = open_db_in_memory().unwrap();
    let storage = InMemoryStorage::default();
    let ppa = create_ppa(&conn, &world);
    let service = attachment_service(&conn, &storage);
    let attachment = service
        .upload_attachment(document(&ppa, "final.pdf"), world.actor)
        .unwrap();

    let reference = world.reference();
    ppa_service(&conn, &reference)
        .change_status(ppa.id(), PpaStatus::Archived, world.actor)
        .unwrap();

    let err = service
        .upload_attachment(document(&ppa, "late.pdf"), world.actor)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TerminalState);
    assert_eq!(storage.file_count(), 1);

    let err = service
        .remove_attachment(attachment.id, world.actor)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TerminalState);
}

#[test]
fn unknown_targets_are_not_found() {
    let world = World::new();
    let conn = open_db_in_memory().unwrap();
    let storage = InMemoryStorage::default();
    let service = attachment_service(&conn, &storage);

    let err = service
        .register_attachment(
            Uuid::new_v4(),
            AttachmentType::Other,
            "x",
            "k",
            None,
            world.actor,
        )
        .unwrap_err();
    assert!(matches!(err, PpaServiceError::PpaNotFound(_)));
    assert_eq!(
        service
            .remove_attachment(Uuid::new_v4(), world.actor)
            .unwrap_err()
            .kind(),
        ErrorKind::NotFound
    );
}
