//! Filtered search over `/Users`, `/Groups` and the server root.

use crate::common::FlakyStorage;
use crate::common::fixtures::{self, Seeded};
use scim_store::error::ScimError;
use scim_store::filter::FilterError;
use scim_store::resource::User;
use scim_store::{Backend, BackendBuilder, ListResponse, SearchRequest, SearchScope};
use std::sync::atomic::Ordering;

async fn search(seeded: &Seeded, filter: &str, scope: SearchScope) -> ListResponse {
    seeded
        .backend
        .search(&SearchRequest::with_filter(filter), scope)
        .await
        .unwrap_or_else(|e| panic!("search '{}' failed: {}", filter, e))
}

fn user_names(response: &ListResponse) -> Vec<&str> {
    response.users().map(|u| u.user_name.as_str()).collect()
}

fn group_names(response: &ListResponse) -> Vec<&str> {
    response.groups().map(|g| g.display_name.as_str()).collect()
}

#[tokio::test]
async fn test_user_name_matches_ignoring_case() {
    let seeded = fixtures::seeded().await;
    let response = search(&seeded, "userName eq \"ALICE\"", SearchScope::Users).await;

    assert_eq!(user_names(&response), vec!["alice"]);
    assert_eq!(response.users().next().unwrap().id.as_deref(), Some(seeded.alice.as_str()));
}

#[tokio::test]
async fn test_string_operators() {
    let seeded = fixtures::seeded().await;

    let response = search(&seeded, "userName sw \"AL\"", SearchScope::Users).await;
    assert_eq!(user_names(&response), vec!["alice"]);

    let response = search(&seeded, "emails.value ew \"example.org\"", SearchScope::Users).await;
    assert_eq!(user_names(&response), vec!["bob"]);

    let response = search(&seeded, "emails co \"@example\"", SearchScope::Users).await;
    assert_eq!(user_names(&response), vec!["alice", "bob"]);
}

#[tokio::test]
async fn test_dotted_complex_attribute() {
    let backend = fixtures::backend();
    backend.create_user(fixtures::bjensen()).await.unwrap();
    backend.create_user(User::new("nobody")).await.unwrap();

    let response = backend
        .search(
            &SearchRequest::with_filter("name.familyName sw \"J\" and name.givenName pr"),
            SearchScope::All,
        )
        .await
        .unwrap();
    assert_eq!(user_names(&response), vec!["bjensen@example.com"]);

    let response = backend
        .search(
            &SearchRequest::with_filter("urn:ietf:params:scim:schemas:core:2.0:User:title eq \"tour guide\""),
            SearchScope::Users,
        )
        .await
        .unwrap();
    assert_eq!(response.total_results, 1);
}

#[tokio::test]
async fn test_logical_operators() {
    let seeded = fixtures::seeded().await;

    let response = search(
        &seeded,
        "userName eq \"alice\" or displayName co \"inc\"",
        SearchScope::Users,
    )
    .await;
    assert_eq!(user_names(&response), vec!["alice", "bob"]);

    let response = search(
        &seeded,
        "emails.type eq \"home\" and userName sw \"b\"",
        SearchScope::Users,
    )
    .await;
    assert_eq!(user_names(&response), vec!["bob"]);
}

#[tokio::test]
async fn test_root_search_spans_types_users_first() {
    let seeded = fixtures::seeded().await;
    let response = search(&seeded, "displayName co \"Inc\"", SearchScope::All).await;

    assert_eq!(response.total_results, 2);
    assert_eq!(user_names(&response), vec!["bob"]);
    assert_eq!(group_names(&response), vec!["Acme Inc"]);
    assert!(response.resources[0].as_user().is_some());
    assert!(response.resources[1].as_group().is_some());
}

#[tokio::test]
async fn test_attribute_known_to_one_type() {
    let seeded = fixtures::seeded().await;

    let response = search(&seeded, "emails.type eq \"work\"", SearchScope::All).await;
    assert_eq!(user_names(&response), vec!["alice"]);
    assert!(group_names(&response).is_empty());

    let filter = format!("members.value eq \"{}\"", seeded.alice);
    let response = search(&seeded, &filter, SearchScope::All).await;
    assert_eq!(group_names(&response), vec!["Acme Inc"]);
    assert_eq!(response.users().count(), 0);

    // or keeps the side that does apply to each type
    let response = search(
        &seeded,
        "userName eq \"bob\" or displayName eq \"Admins\"",
        SearchScope::All,
    )
    .await;
    assert_eq!(user_names(&response), vec!["bob"]);
    assert_eq!(group_names(&response), vec!["Admins"]);
}

#[tokio::test]
async fn test_member_presence() {
    let seeded = fixtures::seeded().await;
    let response = search(&seeded, "members pr", SearchScope::Groups).await;
    assert_eq!(group_names(&response), vec!["Acme Inc"]);
}

#[tokio::test]
async fn test_search_results_carry_memberships() {
    let seeded = fixtures::seeded().await;
    let response = search(&seeded, "userName eq \"alice\"", SearchScope::Users).await;

    let alice = response.users().next().unwrap();
    assert_eq!(alice.groups.len(), 1);
    assert_eq!(alice.groups[0].value, seeded.acme);
}

#[tokio::test]
async fn test_unknown_attributes() {
    let seeded = fixtures::seeded().await;

    let error = seeded
        .backend
        .search(&SearchRequest::with_filter("shoeSize eq \"9\""), SearchScope::All)
        .await
        .unwrap_err();
    assert!(matches!(error, ScimError::Filter(FilterError::Lookup(_))));
    assert_eq!(error.status_code(), 400);
    assert_eq!(error.scim_type(), Some("invalidFilter"));

    let error = seeded
        .backend
        .search(&SearchRequest::with_filter("emails.color eq \"red\""), SearchScope::Users)
        .await
        .unwrap_err();
    assert!(matches!(error, ScimError::Filter(_)));
}

#[tokio::test]
async fn test_unsupported_filters_are_rejected() {
    let seeded = fixtures::seeded().await;
    for filter in [
        "userName ne \"alice\"",
        "not (userName eq \"alice\")",
        "emails[type eq \"work\"]",
    ] {
        let result = seeded
            .backend
            .search(&SearchRequest::with_filter(filter), SearchScope::Users)
            .await;
        assert!(
            matches!(result, Err(ScimError::Filter(FilterError::Unimplemented(_)))),
            "{} should be unimplemented",
            filter
        );
    }

    let result = seeded
        .backend
        .search(&SearchRequest::with_filter("userName eq"), SearchScope::Users)
        .await;
    assert!(matches!(result, Err(ScimError::Parse(_))));
}

#[tokio::test]
async fn test_blank_filter_lists_everything() {
    let seeded = fixtures::seeded().await;
    let response = search(&seeded, "   ", SearchScope::All).await;
    assert_eq!(response.total_results, 4);
    assert_eq!(user_names(&response), vec!["alice", "bob"]);
    assert_eq!(group_names(&response), vec!["Acme Inc", "Admins"]);
}

#[tokio::test]
async fn test_paging_window() {
    let seeded = fixtures::seeded().await;
    let backend = &seeded.backend;

    let page = backend
        .search(&SearchRequest::default().paged(2, 2), SearchScope::All)
        .await
        .unwrap();
    assert_eq!(page.total_results, 4);
    assert_eq!(page.start_index, 2);
    assert_eq!(page.items_per_page, 2);
    assert_eq!(user_names(&page), vec!["bob"]);
    assert_eq!(group_names(&page), vec!["Acme Inc"]);

    let past_the_end = backend
        .search(&SearchRequest::default().paged(10, 5), SearchScope::All)
        .await
        .unwrap();
    assert_eq!(past_the_end.total_results, 4);
    assert!(past_the_end.resources.is_empty());

    let counted = backend
        .search(&SearchRequest::default().paged(1, 0), SearchScope::All)
        .await
        .unwrap();
    assert_eq!(counted.total_results, 4);
    assert_eq!(counted.items_per_page, 0);
}

#[tokio::test]
async fn test_page_size_is_bounded() {
    let backend = BackendBuilder::new(scim_store::InMemoryStorage::new())
        .with_max_results(2)
        .with_default_page_size(1)
        .build()
        .unwrap();
    for name in ["a", "b", "c"] {
        backend.create_user(User::new(name)).await.unwrap();
        fixtures::pause().await;
    }

    let response = backend
        .search(&SearchRequest::default(), SearchScope::Users)
        .await
        .unwrap();
    assert_eq!(response.items_per_page, 1);

    let response = backend
        .search(&SearchRequest::default().paged(1, 50), SearchScope::Users)
        .await
        .unwrap();
    assert_eq!(response.total_results, 3);
    assert_eq!(response.items_per_page, 2);
}

#[tokio::test]
async fn test_search_request_from_json() {
    let seeded = fixtures::seeded().await;
    let request: SearchRequest = serde_json::from_value(serde_json::json!({
        "schemas": ["urn:ietf:params:scim:api:messages:2.0:SearchRequest"],
        "filter": "userName eq \"bob\"",
        "startIndex": 1,
        "count": 10
    }))
    .unwrap();

    let response = seeded.backend.search(&request, SearchScope::All).await.unwrap();
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["totalResults"], 1);
    assert_eq!(json["itemsPerPage"], 1);
    assert_eq!(json["Resources"][0]["userName"], "bob");
    assert_eq!(json["Resources"][0]["meta"]["resourceType"], "User");
}

async fn flaky_backend() -> Backend<FlakyStorage> {
    let backend = BackendBuilder::new(FlakyStorage::new()).build().unwrap();
    backend.create_user(User::new("alice")).await.unwrap();
    backend
        .create_group(scim_store::Group::new("Admins"))
        .await
        .unwrap();
    backend
}

#[tokio::test]
async fn test_unsatisfiable_filter_skips_storage() {
    let backend = flaky_backend().await;

    let response = backend
        .search(
            &SearchRequest::with_filter("userName eq \"alice\" and members pr"),
            SearchScope::All,
        )
        .await
        .unwrap();

    assert_eq!(response.total_results, 0);
    assert_eq!(backend.storage().query_count(), 0);
}

#[tokio::test]
async fn test_user_attribute_on_groups_endpoint_is_empty() {
    let backend = flaky_backend().await;

    let response = backend
        .search(
            &SearchRequest::with_filter("userName eq \"alice\""),
            SearchScope::Groups,
        )
        .await
        .unwrap();

    assert_eq!(response.total_results, 0);
    assert!(response.resources.is_empty());
    assert_eq!(backend.storage().query_count(), 0);

    // still an error when no resource type has the attribute
    let error = backend
        .search(&SearchRequest::with_filter("shoeSize eq \"9\""), SearchScope::Groups)
        .await
        .unwrap_err();
    assert_eq!(error.scim_type(), Some("invalidFilter"));
}

#[tokio::test]
async fn test_types_without_predicate_are_not_queried() {
    let backend = flaky_backend().await;
    backend
        .storage()
        .fail_user_queries
        .store(true, Ordering::SeqCst);

    let response = backend
        .search(
            &SearchRequest::with_filter("members pr or displayName eq \"Admins\""),
            SearchScope::All,
        )
        .await;
    // displayName applies to users too, so users are queried and fail
    assert!(matches!(response, Err(ScimError::Storage(_))));

    // members is unknown to users, so only groups are queried
    let response = backend
        .search(&SearchRequest::with_filter("members pr"), SearchScope::All)
        .await
        .unwrap();
    assert_eq!(response.total_results, 0);

    let response = backend
        .search(&SearchRequest::default(), SearchScope::Groups)
        .await
        .unwrap();
    assert_eq!(group_names(&response), vec!["Admins"]);
}

#[tokio::test]
async fn test_first_storage_error_wins() {
    let backend = flaky_backend().await;
    backend
        .storage()
        .fail_group_queries
        .store(true, Ordering::SeqCst);

    let error = backend
        .search(&SearchRequest::default(), SearchScope::All)
        .await
        .unwrap_err();
    assert!(matches!(error, ScimError::Storage(_)));
    assert_eq!(error.status_code(), 500);
}
