//! Create, replace, get and delete of Users and Groups.

use crate::common::RecordingHook;
use crate::common::fixtures::{self, TEST_SALT};
use scim_store::error::{BuildError, ScimError};
use scim_store::resource::{
    Address, EtagComputer, Group, GroupMember, HttpVersion, MultiValue, User,
};
use scim_store::storage::InMemoryStorage;
use scim_store::BackendBuilder;

#[tokio::test]
async fn test_create_user_assigns_id_meta_and_version() {
    let backend = fixtures::backend();
    let input = fixtures::bjensen();

    let created = backend.create_user(input.clone()).await.unwrap();
    let id = created.id.clone().expect("id assigned");

    let meta = created.meta.clone().expect("meta assigned");
    assert_eq!(meta.resource_type, "User");
    assert_eq!(meta.created, meta.last_modified);
    assert_eq!(
        meta.location.as_deref(),
        Some(format!("https://scim.example.com/v2/Users/{}", id).as_str())
    );
    let expected = EtagComputer::new(TEST_SALT).compute_user(&input);
    assert_eq!(meta.version, Some(expected.to_string()));

    assert_eq!(created.emails, input.emails);
    assert_eq!(created.addresses, input.addresses);
    assert!(created.groups.is_empty());

    let fetched = backend.get_user(&id).await.unwrap();
    assert_eq!(fetched, created);

    let stats = backend.storage().stats().await;
    assert_eq!(stats.user_count, 1);
    // 2 emails, 1 phone number, 1 address, 1 role
    assert_eq!(stats.item_count, 5);
}

#[tokio::test]
async fn test_password_is_stored_but_never_returned() {
    let backend = fixtures::backend();
    let mut input = User::new("bjensen");
    input.password = Some("t1meMa$heen".into());

    let created = backend.create_user(input).await.unwrap();
    assert_eq!(created.password, None);

    let json = serde_json::to_value(&created).unwrap();
    assert!(json.get("password").is_none());
    assert_eq!(json["meta"]["resourceType"], "User");
}

#[tokio::test]
async fn test_user_name_is_unique_ignoring_case() {
    let backend = fixtures::backend();
    backend.create_user(User::new("bjensen")).await.unwrap();

    let error = backend.create_user(User::new("BJensen")).await.unwrap_err();
    assert_eq!(error.status_code(), 409);
    assert_eq!(error.scim_type(), Some("uniqueness"));
    assert_eq!(backend.storage().stats().await.user_count, 1);
}

#[tokio::test]
async fn test_invalid_resources_write_nothing() {
    let backend = fixtures::backend();

    let mut user = User::new("bjensen");
    user.emails = vec![MultiValue {
        value: None,
        ..MultiValue::default()
    }];
    assert!(matches!(
        backend.create_user(user).await,
        Err(ScimError::Validation(_))
    ));

    let mut member = GroupMember::user("2819c223");
    member.member_type = Some("Robot".into());
    let error = backend
        .create_group(Group::new("Tour Guides").with_member(member))
        .await
        .unwrap_err();
    assert_eq!(error.status_code(), 400);

    let stats = backend.storage().stats().await;
    assert_eq!(stats.user_count, 0);
    assert_eq!(stats.group_count, 0);
    assert_eq!(stats.item_count, 0);
}

#[tokio::test]
async fn test_replace_user_swaps_every_collection() {
    let backend = fixtures::backend();
    let created = backend.create_user(fixtures::bjensen()).await.unwrap();
    let id = created.id.clone().unwrap();
    let created_meta = created.meta.clone().unwrap();
    fixtures::pause().await;

    let mut replacement = User::new("bjensen@example.com");
    replacement.emails = vec![MultiValue::new("barbara@example.com").with_primary(true)];

    let replaced = backend
        .replace_user(&id, replacement.clone(), created_meta.version.as_deref())
        .await
        .unwrap();

    assert_eq!(replaced.id, created.id);
    assert_eq!(replaced.emails, replacement.emails);
    assert!(replaced.addresses.is_empty());
    assert!(replaced.phone_numbers.is_empty());
    assert_eq!(replaced.name, None);

    let meta = replaced.meta.unwrap();
    assert_eq!(meta.created, created_meta.created);
    assert!(meta.last_modified > created_meta.last_modified);
    assert_ne!(meta.version, created_meta.version);

    assert_eq!(backend.storage().stats().await.item_count, 1);
}

#[tokio::test]
async fn test_invalid_replace_writes_nothing() {
    let backend = fixtures::backend();
    let created = backend
        .create_user(fixtures::user_with_email("alice", "alice@example.com", "work"))
        .await
        .unwrap();
    let id = created.id.clone().unwrap();

    let mut two_emails = User::new("alice2");
    two_emails.emails = vec![
        MultiValue::new("a@example.com").with_primary(true),
        MultiValue::new("b@example.com").with_primary(true),
    ];
    let error = backend.replace_user(&id, two_emails, None).await.unwrap_err();
    assert!(matches!(error, ScimError::Validation(_)));

    let mut two_addresses = User::new("alice3");
    two_addresses.addresses = vec![
        Address {
            locality: Some("Hollywood".into()),
            primary: Some(true),
            ..Address::default()
        },
        Address {
            locality: Some("Burbank".into()),
            primary: Some(true),
            ..Address::default()
        },
    ];
    let error = backend
        .replace_user(&id, two_addresses, None)
        .await
        .unwrap_err();
    assert!(matches!(error, ScimError::Validation(_)));

    let stored = backend.get_user(&id).await.unwrap();
    assert_eq!(stored.user_name, "alice");
    assert_eq!(stored.emails, created.emails);
    assert!(stored.addresses.is_empty());
    assert_eq!(stored.meta.unwrap().version, created.meta.unwrap().version);

    let group = backend
        .create_group(Group::new("Admins").with_member(GroupMember::user(id.clone())))
        .await
        .unwrap();
    let group_id = group.id.clone().unwrap();
    let error = backend
        .replace_group(
            &group_id,
            Group::new("Renamed").with_member(GroupMember::default()),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(error, ScimError::Validation(_)));

    let stored = backend.get_group(&group_id).await.unwrap();
    assert_eq!(stored.display_name, "Admins");
    assert_eq!(stored.members, group.members);
}

#[tokio::test]
async fn test_replace_preconditions() {
    let backend = fixtures::backend();
    let created = backend.create_user(User::new("bjensen")).await.unwrap();
    let id = created.id.clone().unwrap();
    let version = created.meta.unwrap().version.unwrap();

    let error = backend
        .replace_user(&id, User::new("barbara"), Some("W/\"not-the-version\""))
        .await
        .unwrap_err();
    assert_eq!(error.status_code(), 412);
    assert_eq!(backend.get_user(&id).await.unwrap().user_name, "bjensen");

    // A strong form of the same opaque value still matches.
    let opaque = version.parse::<HttpVersion>().unwrap();
    let strong = format!("\"{}\"", opaque.as_str());
    backend
        .replace_user(&id, User::new("barbara"), Some(&strong))
        .await
        .unwrap();

    backend
        .replace_user(&id, User::new("babs"), Some("*"))
        .await
        .unwrap();
    assert_eq!(backend.get_user(&id).await.unwrap().user_name, "babs");
}

#[tokio::test]
async fn test_group_members_and_derived_user_groups() {
    let backend = fixtures::backend();
    let user = backend.create_user(User::new("bjensen")).await.unwrap();
    let user_id = user.id.unwrap();

    let mut member = GroupMember::user(&user_id);
    member.display = Some("Babs Jensen".into());
    let group = backend
        .create_group(Group::new("Tour Guides").with_member(member))
        .await
        .unwrap();
    let group_id = group.id.clone().unwrap();

    assert_eq!(
        group.members[0].reference.as_deref(),
        Some(format!("https://scim.example.com/v2/Users/{}", user_id).as_str())
    );

    let fetched = backend.get_user(&user_id).await.unwrap();
    assert_eq!(fetched.groups.len(), 1);
    let membership = &fetched.groups[0];
    assert_eq!(membership.value, group_id);
    assert_eq!(membership.display.as_deref(), Some("Tour Guides"));
    assert_eq!(
        membership.reference.as_deref(),
        Some(format!("https://scim.example.com/v2/Groups/{}", group_id).as_str())
    );

    backend.delete_group(&group_id).await.unwrap();
    assert!(backend.get_user(&user_id).await.unwrap().groups.is_empty());
    assert_eq!(
        backend.get_group(&group_id).await.unwrap_err().status_code(),
        404
    );
}

#[tokio::test]
async fn test_replace_group_members() {
    let backend = fixtures::backend();
    let group = backend
        .create_group(
            Group::new("Tour Guides")
                .with_member(GroupMember::user("2819c223"))
                .with_member(GroupMember::user("902c246b")),
        )
        .await
        .unwrap();
    let id = group.id.clone().unwrap();

    let replaced = backend
        .replace_group(
            &id,
            Group::new("Guides").with_member(GroupMember::group("e9e30dba")),
            None,
        )
        .await
        .unwrap();

    assert_eq!(replaced.display_name, "Guides");
    assert_eq!(replaced.members.len(), 1);
    assert_eq!(replaced.members[0].member_type.as_deref(), Some("Group"));
    assert_eq!(backend.storage().stats().await.item_count, 1);
}

#[tokio::test]
async fn test_delete_user_leaves_groups() {
    let seeded = fixtures::seeded().await;
    let backend = &seeded.backend;

    backend.delete_user(&seeded.alice).await.unwrap();

    let acme = backend.get_group(&seeded.acme).await.unwrap();
    assert!(acme.members.is_empty());
    assert!(matches!(
        backend.delete_user(&seeded.alice).await,
        Err(ScimError::ResourceNotFound { .. })
    ));
}

#[tokio::test]
async fn test_hooks_see_committed_writes() {
    let hook = RecordingHook::default();
    let backend = BackendBuilder::new(InMemoryStorage::new())
        .with_hook(hook.clone())
        .build()
        .unwrap();

    backend.create_user(User::new("bjensen")).await.unwrap();
    backend.create_group(Group::new("Tour Guides")).await.unwrap();

    assert_eq!(hook.seen(), vec!["bjensen", "Tour Guides"]);
}

#[tokio::test]
async fn test_failing_hook_does_not_undo_the_write() {
    let hook = RecordingHook::rejecting();
    let backend = BackendBuilder::new(InMemoryStorage::new())
        .with_hook(hook.clone())
        .build()
        .unwrap();

    let error = backend.create_user(User::new("bjensen")).await.unwrap_err();
    assert!(matches!(error, ScimError::Hook { .. }));
    assert_eq!(error.status_code(), 500);
    assert_eq!(backend.storage().stats().await.user_count, 1);
}

#[test]
fn test_builder_rejects_bad_configuration() {
    let result = BackendBuilder::new(InMemoryStorage::new())
        .with_base_url("ftp://scim.example.com")
        .build();
    assert!(matches!(
        result,
        Err(BuildError::InvalidConfiguration { .. })
    ));

    let result = BackendBuilder::new(InMemoryStorage::new())
        .with_max_results(10)
        .with_default_page_size(50)
        .build();
    assert!(result.is_err());
}
