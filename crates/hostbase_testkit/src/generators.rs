//! Property-based test generators using proptest.
//!
//! Provides strategies for generating objects that satisfy the ident
//! requirements of their class.

use hostbase_object::Object;
use proptest::prelude::*;

/// Strategy for generating fully qualified host ids.
pub fn host_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9-]{0,12}\\.(lab|office)\\.example\\.org")
        .expect("Invalid regex")
}

/// Strategy for generating product ids.
pub fn product_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_-]{0,15}").expect("Invalid regex")
}

/// Strategy for generating action requests.
pub fn action_request_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["none", "setup", "uninstall", "update", "once", "always"])
}

/// Strategy for generating installation states.
pub fn installation_status_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["installed", "not_installed", "unknown"])
}

/// Strategy for generating clients.
pub fn client_strategy() -> impl Strategy<Value = Object> {
    (host_id_strategy(), prop::string::string_regex("[a-zA-Z0-9 ]{0,20}").expect("Invalid regex"))
        .prop_map(|(id, description)| Object::opsi_client(&id).with("description", description))
}

/// Strategy for generating product states of one client.
pub fn product_on_client_strategy(client_id: String) -> impl Strategy<Value = Object> {
    (
        product_id_strategy(),
        installation_status_strategy(),
        action_request_strategy(),
    )
        .prop_map(move |(product_id, status, request)| {
            Object::product_on_client(&product_id, "LocalbootProduct", &client_id)
                .with("installationStatus", status)
                .with("actionRequest", request)
        })
}

/// Strategy for generating a small dataset of clients, each with product
/// states.
pub fn dataset_strategy(max_clients: usize) -> impl Strategy<Value = Vec<Object>> {
    prop::collection::vec(host_id_strategy(), 1..=max_clients.max(1)).prop_flat_map(|ids| {
        let states: Vec<_> = ids
            .iter()
            .map(|id| prop::collection::vec(product_on_client_strategy(id.clone()), 0..4))
            .collect();
        (Just(ids), states).prop_map(|(ids, states)| {
            let mut objects: Vec<Object> = ids.iter().map(|id| Object::opsi_client(id)).collect();
            objects.extend(states.into_iter().flatten());
            objects
        })
    })
}
