//! Seeded backends and sample resources.

use scim_store::resource::{Address, Group, GroupMember, MultiValue, Name, User};
use scim_store::storage::InMemoryStorage;
use scim_store::{Backend, BackendBuilder};
use std::time::Duration;

pub const TEST_SALT: &[u8] = b"integration-salt";

/// Route `log` output through the test harness; `RUST_LOG=debug` shows it.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A backend over empty in-memory storage with a fixed salt.
pub fn backend() -> Backend<InMemoryStorage> {
    init_logging();
    BackendBuilder::new(InMemoryStorage::new())
        .with_base_url("https://scim.example.com")
        .with_salt(TEST_SALT)
        .build()
        .expect("valid test configuration")
}

/// Barbara Jensen from RFC 7643 §8.2, trimmed to the stored attributes.
pub fn bjensen() -> User {
    let mut user = User::new("bjensen@example.com");
    user.external_id = Some("bjensen".into());
    user.name = Some(Name::new_simple("Barbara", "Jensen"));
    user.display_name = Some("Babs Jensen".into());
    user.title = Some("Tour Guide".into());
    user.active = Some(true);
    user.emails = vec![
        MultiValue::new("bjensen@example.com")
            .with_type("work")
            .with_primary(true),
        MultiValue::new("babs@jensen.org").with_type("home"),
    ];
    user.phone_numbers = vec![MultiValue::new("555-555-8377").with_type("work")];
    user.addresses = vec![Address {
        street_address: Some("100 Universal City Plaza".into()),
        locality: Some("Hollywood".into()),
        region: Some("CA".into()),
        postal_code: Some("91608".into()),
        country: Some("USA".into()),
        address_type: Some("work".into()),
        primary: Some(true),
        ..Address::default()
    }];
    user.roles = vec![MultiValue::new("guide")];
    user
}

pub fn user_with_email(user_name: &str, email: &str, email_type: &str) -> User {
    let mut user = User::new(user_name);
    user.emails = vec![MultiValue::new(email).with_type(email_type)];
    user
}

/// Resources created one after another, with ids in creation order.
pub struct Seeded {
    pub backend: Backend<InMemoryStorage>,
    pub alice: String,
    pub bob: String,
    pub acme: String,
    pub admins: String,
}

/// Two users and two groups; alice belongs to "Acme Inc".
///
/// Creates are spaced out so creation timestamps give a stable order.
pub async fn seeded() -> Seeded {
    let backend = backend();

    let alice = backend
        .create_user(user_with_email("alice", "alice@example.com", "work"))
        .await
        .expect("create alice");
    pause().await;

    let mut bob = user_with_email("bob", "bob@example.org", "home");
    bob.display_name = Some("Bob Inc".into());
    let bob = backend.create_user(bob).await.expect("create bob");
    pause().await;

    let alice_id = alice.id.expect("alice id");
    let acme = backend
        .create_group(Group::new("Acme Inc").with_member(GroupMember::user(&alice_id)))
        .await
        .expect("create acme");
    pause().await;

    let admins = backend
        .create_group(Group::new("Admins"))
        .await
        .expect("create admins");

    Seeded {
        backend,
        alice: alice_id,
        bob: bob.id.expect("bob id"),
        acme: acme.id.expect("acme id"),
        admins: admins.id.expect("admins id"),
    }
}

pub async fn pause() {
    tokio::time::sleep(Duration::from_millis(2)).await;
}

