use ppa_core::db::open_db_in_memory;
use ppa_core::{
    Authorizer, ErrorKind, Permission, RepoError, RoleRepository, RoleService, SqliteRoleRepository,
    User,
};
use rusqlite::Connection;
use uuid::Uuid;

fn role_service(conn: &Connection) -> RoleService<SqliteRoleRepository<'_>> {
    RoleService::new(SqliteRoleRepository::try_new(conn).unwrap())
}

#[test]
fn seeding_system_roles_is_idempotent() {
    let conn = open_db_in_memory().unwrap();
    let service = role_service(&conn);

    assert_eq!(service.seed_system_roles().unwrap(), 3);
    assert_eq!(service.seed_system_roles().unwrap(), 0);

    let roles = service.list_roles().unwrap();
    let codes: Vec<&str> = roles.iter().map(|role| role.code()).collect();
    assert_eq!(codes, vec!["admin", "coordinator", "teacher"]);
    assert!(roles.iter().all(|role| role.is_system()));

    let admin = &roles[0];
    assert!(admin.has_permission("roles.manage"));
    assert!(admin.has_permission("ppa.continue"));
    let teacher = &roles[2];
    assert!(teacher.has_permission("ppa.view"));
    assert!(!teacher.has_permission("ppa.continue"));
}

#[test]
fn custom_roles_are_created_with_validated_permissions() {
    let conn = open_db_in_memory().unwrap();
    let service = role_service(&conn);

    let reviewer = service
        .create_role(
            " reviewer ",
            "Reviewer",
            Some("Read-only access"),
            &["ppa.view", " ppa.view_history "],
        )
        .unwrap();
    assert!(reviewer.id() > 0);
    assert_eq!(reviewer.code(), "reviewer");
    assert!(!reviewer.is_system());
    assert_eq!(reviewer.permissions().len(), 2);

    let err = service
        .create_role("broken", "Broken", None, &["ppa"])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = service
        .create_role("reviewer", "Again", None, &[])
        .unwrap_err();
    assert!(matches!(err, RepoError::Duplicate { .. }));
    assert_eq!(err.kind(), ErrorKind::Duplicate);
}

#[test]
fn grant_and_revoke_are_persisted() {
    let conn = open_db_in_memory().unwrap();
    let service = role_service(&conn);
    let role = service
        .create_role("reviewer", "Reviewer", None, &["ppa.view"])
        .unwrap();

    service.grant(role.id(), "ppa.view_history").unwrap();
    service.revoke(role.id(), "ppa.view").unwrap();

    let repo = SqliteRoleRepository::try_new(&conn).unwrap();
    let stored = repo.get_role(role.id()).unwrap().unwrap();
    let permissions: Vec<&str> = stored
        .permissions()
        .iter()
        .map(Permission::as_str)
        .collect();
    assert_eq!(permissions, vec!["ppa.view_history"]);

    // Revoking something the role lacks leaves it unchanged.
    let unchanged = service.revoke(role.id(), "ppa.view").unwrap();
    assert_eq!(unchanged, stored);
}

#[test]
fn system_roles_cannot_be_deleted() {
    let conn = open_db_in_memory().unwrap();
    let service = role_service(&conn);
    service.seed_system_roles().unwrap();
    let repo = SqliteRoleRepository::try_new(&conn).unwrap();
    let admin = repo.get_role_by_code("admin").unwrap().unwrap();

    let err = service.delete_role(admin.id()).unwrap_err();
    assert!(matches!(err, RepoError::SystemRole(ref code) if code == "admin"));
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(repo.get_role(admin.id()).unwrap().is_some());

    let custom = service
        .create_role("reviewer", "Reviewer", None, &["ppa.view"])
        .unwrap();
    service.delete_role(custom.id()).unwrap();
    assert!(repo.get_role(custom.id()).unwrap().is_none());
    let remaining: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM role_permissions WHERE role_id = ?1;",
            [custom.id()],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(remaining, 0);
}

#[test]
fn unknown_roles_are_not_found() {
    let conn = open_db_in_memory().unwrap();
    let service = role_service(&conn);

    assert_eq!(
        service.grant(404, "ppa.view").unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert_eq!(
        service.delete_role(404).unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

#[test]
fn users_authorize_through_their_roles() {
    let conn = open_db_in_memory().unwrap();
    let service = role_service(&conn);
    service.seed_system_roles().unwrap();
    let teacher = SqliteRoleRepository::try_new(&conn)
        .unwrap()
        .get_role_by_code("teacher")
        .unwrap()
        .unwrap();

    let user = User::new(Uuid::new_v4(), vec![teacher]);
    assert!(Authorizer::has_permission(
        &user,
        &Permission::parse("ppa.update").unwrap()
    ));
    assert!(!Authorizer::has_permission(
        &user,
        &Permission::parse("roles.manage").unwrap()
    ));
}
