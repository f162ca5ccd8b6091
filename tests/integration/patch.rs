//! PATCH add, remove and replace through the Patch Engine.

use crate::common::fixtures;
use scim_store::error::ScimError;
use scim_store::filter::ScimFilterParser;
use scim_store::patch::{Owner, PatchEngine, PatchError, PatchOperation, PatchRequest};
use scim_store::resource::{Group, GroupMember, MultiValue, User};
use scim_store::storage::{InMemoryStorage, StorageProvider};
use scim_store::{Backend, BackendBuilder};
use serde_json::json;
use uuid::Uuid;

async fn patch_user(
    backend: &Backend<InMemoryStorage>,
    id: &str,
    operations: Vec<PatchOperation>,
) -> Result<User, ScimError> {
    backend.patch_user(id, &PatchRequest::new(operations)).await
}

async fn created_bjensen(backend: &Backend<InMemoryStorage>) -> String {
    backend
        .create_user(fixtures::bjensen())
        .await
        .unwrap()
        .id
        .unwrap()
}

fn patch_error(error: ScimError) -> PatchError {
    match error {
        ScimError::Patch(e) => e,
        other => panic!("Expected a patch error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_add_items_is_idempotent() {
    let backend = fixtures::backend();
    let id = created_bjensen(&backend).await;

    let other = json!({"value": "barbara@jensen.org", "type": "other"});
    let patched = patch_user(&backend, &id, vec![PatchOperation::add("emails", other.clone())])
        .await
        .unwrap();
    assert_eq!(patched.emails.len(), 3);

    let patched = patch_user(
        &backend,
        &id,
        vec![PatchOperation::add("emails", json!([other]))],
    )
    .await
    .unwrap();
    assert_eq!(patched.emails.len(), 3);
    assert_eq!(
        patched.emails[2],
        MultiValue::new("barbara@jensen.org").with_type("other")
    );
}

#[tokio::test]
async fn test_add_second_primary_is_rejected() {
    let backend = fixtures::backend();
    let id = created_bjensen(&backend).await;
    let before = backend.storage().stats().await.item_count;

    let error = patch_user(
        &backend,
        &id,
        vec![PatchOperation::add(
            "emails",
            json!({"value": "new@example.com", "primary": true}),
        )],
    )
    .await
    .unwrap_err();

    assert!(matches!(error, ScimError::Validation(_)));
    assert_eq!(error.status_code(), 400);
    assert_eq!(backend.storage().stats().await.item_count, before);
}

#[tokio::test]
async fn test_replace_sub_attribute_of_selected_item() {
    let backend = fixtures::backend();
    let id = created_bjensen(&backend).await;

    let patched = patch_user(
        &backend,
        &id,
        vec![PatchOperation::replace(
            "emails[type eq \"work\"].value",
            json!("barbara@example.com"),
        )],
    )
    .await
    .unwrap();

    let work = patched
        .emails
        .iter()
        .find(|e| e.item_type.as_deref() == Some("work"))
        .unwrap();
    assert_eq!(work.value.as_deref(), Some("barbara@example.com"));
    assert_eq!(work.primary, Some(true));
}

#[tokio::test]
async fn test_selection_must_be_singular() {
    let backend = fixtures::backend();
    let id = created_bjensen(&backend).await;

    let error = patch_user(
        &backend,
        &id,
        vec![PatchOperation::replace(
            "emails[type eq \"other\"].value",
            json!("x@example.com"),
        )],
    )
    .await
    .unwrap_err();
    assert_eq!(error.scim_type(), Some("noTarget"));
    assert_eq!(patch_error(error), PatchError::NotSingular);

    let error = patch_user(
        &backend,
        &id,
        vec![PatchOperation::add(
            "emails[value co \"@\"].display",
            json!("Babs"),
        )],
    )
    .await
    .unwrap_err();
    assert_eq!(patch_error(error), PatchError::NotSingular);
}

#[tokio::test]
async fn test_setting_primary_on_a_second_item() {
    let backend = fixtures::backend();
    let id = created_bjensen(&backend).await;

    let error = patch_user(
        &backend,
        &id,
        vec![PatchOperation::replace(
            "emails[type eq \"home\"].primary",
            json!(true),
        )],
    )
    .await
    .unwrap_err();
    assert!(matches!(error, ScimError::Validation(_)));

    let patched = patch_user(
        &backend,
        &id,
        vec![
            PatchOperation::replace("emails[type eq \"work\"].primary", json!(false)),
            PatchOperation::replace("emails[type eq \"home\"].primary", json!("True")),
        ],
    )
    .await
    .unwrap();
    let primary: Vec<_> = patched
        .emails
        .iter()
        .filter(|e| e.primary == Some(true))
        .map(|e| e.item_type.as_deref())
        .collect();
    assert_eq!(primary, vec![Some("home")]);
}

#[tokio::test]
async fn test_remove_items() {
    let backend = fixtures::backend();
    let id = created_bjensen(&backend).await;

    let patched = patch_user(
        &backend,
        &id,
        vec![PatchOperation::remove("emails[type eq \"home\"]")],
    )
    .await
    .unwrap();
    assert_eq!(patched.emails.len(), 1);
    assert_eq!(patched.emails[0].item_type.as_deref(), Some("work"));

    let patched = patch_user(
        &backend,
        &id,
        vec![
            PatchOperation::remove("emails"),
            PatchOperation::remove("addresses"),
        ],
    )
    .await
    .unwrap();
    assert!(patched.emails.is_empty());
    assert!(patched.addresses.is_empty());
    assert_eq!(patched.phone_numbers.len(), 1);
}

#[tokio::test]
async fn test_removing_sub_attribute_of_selected_item_is_refused() {
    let backend = fixtures::backend();
    let id = created_bjensen(&backend).await;

    let error = patch_user(
        &backend,
        &id,
        vec![PatchOperation::remove("emails[type eq \"work\"].value")],
    )
    .await
    .unwrap_err();
    assert_eq!(error.scim_type(), Some("mutability"));
    assert!(matches!(patch_error(error), PatchError::Immutable(_)));
}

#[tokio::test]
async fn test_replace_whole_collection() {
    let backend = fixtures::backend();
    let id = created_bjensen(&backend).await;

    let patched = patch_user(
        &backend,
        &id,
        vec![PatchOperation::replace(
            "emails",
            json!([
                {"value": "one@example.com", "primary": true},
                {"value": "two@example.com"}
            ]),
        )],
    )
    .await
    .unwrap();
    let values: Vec<_> = patched.emails.iter().filter_map(|e| e.value.as_deref()).collect();
    assert_eq!(values, vec!["one@example.com", "two@example.com"]);
}

#[tokio::test]
async fn test_replace_merges_into_selected_items() {
    let backend = fixtures::backend();
    let id = created_bjensen(&backend).await;

    let patched = patch_user(
        &backend,
        &id,
        vec![PatchOperation::replace(
            "addresses[type eq \"work\"]",
            json!({"locality": "Burbank", "postalCode": "91502"}),
        )],
    )
    .await
    .unwrap();
    let address = &patched.addresses[0];
    assert_eq!(address.locality.as_deref(), Some("Burbank"));
    assert_eq!(address.postal_code.as_deref(), Some("91502"));
    assert_eq!(address.region.as_deref(), Some("CA"));

    let error = patch_user(
        &backend,
        &id,
        vec![PatchOperation::replace(
            "addresses[type eq \"home\"]",
            json!({"locality": "Burbank"}),
        )],
    )
    .await
    .unwrap_err();
    assert!(matches!(patch_error(error), PatchError::NoTarget(_)));
}

#[tokio::test]
async fn test_scalar_and_complex_attributes() {
    let backend = fixtures::backend();
    let id = created_bjensen(&backend).await;

    let patched = patch_user(
        &backend,
        &id,
        vec![
            PatchOperation::replace("title", json!("Senior Tour Guide")),
            PatchOperation::replace("active", json!("False")),
            PatchOperation::replace("name", json!({"givenName": "Babs"})),
            PatchOperation::remove("displayName"),
        ],
    )
    .await
    .unwrap();

    assert_eq!(patched.title.as_deref(), Some("Senior Tour Guide"));
    assert_eq!(patched.active, Some(false));
    assert_eq!(patched.display_name, None);
    let name = patched.name.unwrap();
    assert_eq!(name.given_name.as_deref(), Some("Babs"));
    assert_eq!(name.family_name, None);

    let patched = patch_user(
        &backend,
        &id,
        vec![
            PatchOperation::add("name.familyName", json!("Jensen")),
            PatchOperation::remove("name.givenName"),
        ],
    )
    .await
    .unwrap();
    let name = patched.name.unwrap();
    assert_eq!(name.family_name.as_deref(), Some("Jensen"));
    assert_eq!(name.given_name, None);
}

#[tokio::test]
async fn test_operation_without_path() {
    let backend = fixtures::backend();
    let id = created_bjensen(&backend).await;

    let request: PatchRequest = serde_json::from_value(json!({
        "schemas": ["urn:ietf:params:scim:api:messages:2.0:PatchOp"],
        "Operations": [{
            "op": "Replace",
            "value": {
                "nickName": "Babs",
                "emails": [{"value": "only@example.com"}]
            }
        }]
    }))
    .unwrap();

    let patched = backend.patch_user(&id, &request).await.unwrap();
    assert_eq!(patched.nick_name.as_deref(), Some("Babs"));
    assert_eq!(patched.emails, vec![MultiValue::new("only@example.com")]);
}

#[tokio::test]
async fn test_invalid_values_and_paths() {
    let backend = fixtures::backend();
    let id = created_bjensen(&backend).await;

    let cases = [
        (PatchOperation::replace("id", json!("x")), "mutability"),
        (PatchOperation::replace("meta.version", json!("x")), "mutability"),
        (PatchOperation::replace("shoeSize", json!("9")), "invalidPath"),
        (PatchOperation::replace("emails.value", json!("x")), "invalidPath"),
        (PatchOperation::replace("active", json!(7)), "invalidValue"),
        (PatchOperation::add("title", json!(null)), "invalidValue"),
        (PatchOperation::replace("emails[type eq", json!("x")), "invalidPath"),
    ];
    for (operation, scim_type) in cases {
        let path = operation.path.clone();
        let error = patch_user(&backend, &id, vec![operation]).await.unwrap_err();
        assert_eq!(error.status_code(), 400, "{:?}", path);
        assert_eq!(error.scim_type(), Some(scim_type), "{:?}", path);
    }
}

#[tokio::test]
async fn test_request_envelope_is_checked() {
    let backend = fixtures::backend();
    let id = created_bjensen(&backend).await;

    let mut request = PatchRequest::new(vec![PatchOperation::replace("title", json!("x"))]);
    request.schemas = vec!["urn:example:wrong".into()];
    let error = backend.patch_user(&id, &request).await.unwrap_err();
    assert_eq!(patch_error(error), PatchError::InvalidSchema);

    let error = patch_user(&backend, &id, Vec::new()).await.unwrap_err();
    assert_eq!(error.status_code(), 400);

    let parsed: Result<PatchRequest, _> = serde_json::from_value(json!({
        "schemas": ["urn:ietf:params:scim:api:messages:2.0:PatchOp"],
        "Operations": [{"op": "move", "path": "title"}]
    }));
    assert!(parsed.is_err());

    let missing = Uuid::new_v4().to_string();
    let error = patch_user(
        &backend,
        &missing,
        vec![PatchOperation::replace("title", json!("x"))],
    )
    .await
    .unwrap_err();
    assert_eq!(error.status_code(), 404);
}

#[tokio::test]
async fn test_earlier_operations_stay_applied() {
    let backend = fixtures::backend();
    let id = created_bjensen(&backend).await;

    let result = patch_user(
        &backend,
        &id,
        vec![
            PatchOperation::replace("title", json!("Manager")),
            PatchOperation::replace("emails[type eq \"other\"].value", json!("x")),
        ],
    )
    .await;
    assert!(result.is_err());
    assert_eq!(
        backend.get_user(&id).await.unwrap().title.as_deref(),
        Some("Manager")
    );
}

#[tokio::test]
async fn test_group_members() {
    let seeded = fixtures::seeded().await;
    let backend = &seeded.backend;

    let patched = backend
        .patch_group(
            &seeded.admins,
            &PatchRequest::new(vec![PatchOperation::add(
                "members",
                json!([{"value": seeded.alice}, {"value": seeded.bob, "display": "Bob"}]),
            )]),
        )
        .await
        .unwrap();
    assert_eq!(patched.members.len(), 2);
    assert_eq!(
        patched.members[0].reference.as_deref(),
        Some(format!("https://scim.example.com/v2/Users/{}", seeded.alice).as_str())
    );
    assert_eq!(backend.get_user(&seeded.alice).await.unwrap().groups.len(), 2);

    let patched = backend
        .patch_group(
            &seeded.admins,
            &PatchRequest::new(vec![PatchOperation::remove(format!(
                "members[value eq \"{}\"]",
                seeded.alice
            ))]),
        )
        .await
        .unwrap();
    assert_eq!(patched.members.len(), 1);
    assert_eq!(patched.members[0].display.as_deref(), Some("Bob"));
    assert_eq!(backend.get_user(&seeded.alice).await.unwrap().groups.len(), 1);

    let error = backend
        .patch_group(
            &seeded.admins,
            &PatchRequest::new(vec![PatchOperation::add(
                "members",
                json!({"value": "x", "type": "Robot"}),
            )]),
        )
        .await
        .unwrap_err();
    assert!(matches!(error, ScimError::Validation(_)));
}

#[tokio::test]
async fn test_version_is_kept_by_default() {
    let backend = fixtures::backend();
    let created = backend.create_user(fixtures::bjensen()).await.unwrap();
    let id = created.id.clone().unwrap();
    let before = created.meta.unwrap();
    fixtures::pause().await;

    let patched = patch_user(
        &backend,
        &id,
        vec![PatchOperation::replace("title", json!("Manager"))],
    )
    .await
    .unwrap();

    let after = patched.meta.unwrap();
    assert_eq!(after.version, before.version);
    assert!(after.last_modified > before.last_modified);
    assert_eq!(after.created, before.created);
}

#[tokio::test]
async fn test_version_is_recomputed_when_enabled() {
    let backend = BackendBuilder::new(InMemoryStorage::new())
        .with_salt(fixtures::TEST_SALT)
        .recompute_etag_on_patch(true)
        .build()
        .unwrap();
    let created = backend
        .create_group(Group::new("Tour Guides"))
        .await
        .unwrap();
    let id = created.id.clone().unwrap();

    let patched = backend
        .patch_group(
            &id,
            &PatchRequest::new(vec![PatchOperation::add(
                "members",
                json!({"value": "2819c223", "type": "User"}),
            )]),
        )
        .await
        .unwrap();

    let version = patched.meta.clone().unwrap().version;
    assert_ne!(version, created.meta.unwrap().version);
    assert_eq!(
        version,
        Some(backend.etags().compute_group(&patched).to_string())
    );
}

#[tokio::test]
async fn test_no_op_patch_keeps_recomputed_version() {
    let backend = BackendBuilder::new(InMemoryStorage::new())
        .with_salt(fixtures::TEST_SALT)
        .recompute_etag_on_patch(true)
        .build()
        .unwrap();

    // the member $ref is generated on write
    let group = backend
        .create_group(Group::new("Tour Guides").with_member(GroupMember::user("u1")))
        .await
        .unwrap();
    let patched = backend
        .patch_group(
            group.id.as_deref().unwrap(),
            &PatchRequest::new(vec![PatchOperation::add(
                "members",
                json!({"value": "u1", "type": "User"}),
            )]),
        )
        .await
        .unwrap();
    assert_eq!(patched.members.len(), 1);
    assert_eq!(patched.meta.unwrap().version, group.meta.unwrap().version);

    let mut user = User::new("bjensen");
    user.emails = vec![MultiValue::new("bjensen@example.com").with_type("work")];
    let user = backend.create_user(user).await.unwrap();
    let patched = patch_user(
        &backend,
        user.id.as_deref().unwrap(),
        vec![PatchOperation::add(
            "emails",
            json!({"value": "bjensen@example.com", "type": "work"}),
        )],
    )
    .await
    .unwrap();
    assert_eq!(patched.emails.len(), 1);
    assert_eq!(patched.meta.unwrap().version, user.meta.unwrap().version);
}

#[tokio::test]
async fn test_engine_applies_to_a_loaded_row() {
    let backend = fixtures::backend();
    let user = backend.create_user(User::new("bjensen")).await.unwrap();
    let uuid = Uuid::parse_str(user.id.as_deref().unwrap()).unwrap();

    let record = backend.storage().get_user(uuid).await.unwrap().unwrap();
    let mut owner = Owner::User(record.row);
    let parser = ScimFilterParser::default();
    let engine = PatchEngine::new(backend.storage(), &parser, backend.config());

    engine
        .apply(&mut owner, &PatchOperation::replace("userName", json!("barbara")))
        .await
        .unwrap();
    engine
        .apply(
            &mut owner,
            &PatchOperation::add("roles", json!({"value": "guide"})),
        )
        .await
        .unwrap();

    match &owner {
        Owner::User(row) => assert_eq!(row.user_name, "barbara"),
        other => panic!("Expected a user, got {:?}", other),
    }
    let fetched = backend.get_user(&uuid.to_string()).await.unwrap();
    assert_eq!(fetched.user_name, "barbara");
    assert_eq!(fetched.roles, vec![MultiValue::new("guide")]);
}

#[tokio::test]
async fn test_members_added_to_replaced_group_keep_membership() {
    let backend = fixtures::backend();
    let user = backend.create_user(User::new("bjensen")).await.unwrap();
    let user_id = user.id.unwrap();
    let group = backend
        .create_group(Group::new("Guides").with_member(GroupMember::user(&user_id)))
        .await
        .unwrap();

    let patched = backend
        .patch_group(
            group.id.as_deref().unwrap(),
            &PatchRequest::new(vec![PatchOperation::replace(
                format!("members[value eq \"{}\"].display", user_id),
                json!("Babs"),
            )]),
        )
        .await
        .unwrap();
    assert_eq!(patched.members[0].display.as_deref(), Some("Babs"));
    assert_eq!(backend.get_user(&user_id).await.unwrap().groups.len(), 1);
}
