//! Storage properties shared by every engine's integration tests.
//!
//! Each check creates its own uniquely named rows so it can run against a
//! database that already holds data from earlier runs.

#![allow(dead_code)]

use geolocation_store::{
    Store, StoreError,
    models::{
        geolocation::GeolocationFields,
        ip_address::IpFamily,
        request::NewRequest,
        user::{NewUser, User, UserRole},
    },
    services::api_key_service,
    store::constraints,
};
use serde_json::json;
use uuid::Uuid;

fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

fn unique_email() -> String {
    format!("{}@example.com", unique("user"))
}

/// Random address in 10.0.0.0/8.
fn unique_ipv4() -> String {
    let bytes = Uuid::new_v4().into_bytes();
    format!("10.{}.{}.{}", bytes[0], bytes[1], bytes[2])
}

/// Canonical address from the 2001:db8::/32 documentation block.
///
/// Every random group is non-zero so the only zero run is the `::`.
fn unique_ipv6() -> String {
    let bytes = Uuid::new_v4().into_bytes();
    format!(
        "2001:db8:{:x}:{:x}::{:x}",
        u16::from_be_bytes([bytes[0], bytes[1]]) | 1,
        u16::from_be_bytes([bytes[2], bytes[3]]) | 1,
        u16::from_be_bytes([bytes[4], bytes[5]]) | 1,
    )
}

async fn role<S: Store>(store: &S) -> UserRole {
    store.create_role(&unique("role")).await.unwrap()
}

async fn user<S: Store>(store: &S, role: &UserRole) -> User {
    store
        .create_user(NewUser {
            email: unique_email(),
            password_hash: "argon2-hash".into(),
            role_id: role.id,
        })
        .await
        .unwrap()
}

pub async fn duplicate_email_is_rejected<S: Store>(store: &S) {
    let role = role(store).await;
    let email = unique_email();
    let new_user = NewUser {
        email: email.clone(),
        password_hash: "h1".into(),
        role_id: role.id,
    };

    let first = store.create_user(new_user.clone()).await.unwrap();
    assert_eq!(first.email, email);
    assert_eq!(first.created_at, first.updated_at);

    let err = store.create_user(new_user).await.unwrap_err();
    assert!(
        err.is_unique_violation_on(constraints::USER_EMAIL_UNIQUE),
        "unexpected error: {err:?}"
    );
}

pub async fn user_with_unknown_role_is_rejected<S: Store>(store: &S) {
    let err = store
        .create_user(NewUser {
            email: unique_email(),
            password_hash: "h".into(),
            role_id: Uuid::new_v4(),
        })
        .await
        .unwrap_err();
    assert!(
        err.is_foreign_key_violation(),
        "unexpected error: {err:?}"
    );
}

pub async fn children_of_unknown_user_are_rejected<S: Store>(store: &S) {
    let ghost = Uuid::new_v4();

    let err = store.create_api_key(ghost).await.unwrap_err();
    assert!(matches!(err, StoreError::ForeignKeyViolation { .. }));

    let err = store
        .record_request(NewRequest {
            user_id: ghost,
            ip_address: "198.51.100.7".into(),
            response: json!({}),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::ForeignKeyViolation { .. }));
}

pub async fn user_delete_cascades<S: Store>(store: &S) {
    let role = role(store).await;
    let owner = user(store, &role).await;
    let bystander = user(store, &role).await;

    let key_a = store.create_api_key(owner.id).await.unwrap();
    let key_b = store.create_api_key(owner.id).await.unwrap();
    let kept_key = store.create_api_key(bystander.id).await.unwrap();
    for user_id in [owner.id, owner.id, owner.id, bystander.id] {
        store
            .record_request(NewRequest {
                user_id,
                ip_address: "198.51.100.7".into(),
                response: json!({ "country": "US", "city": null }),
            })
            .await
            .unwrap();
    }

    let deletion = store.delete_user(owner.id).await.unwrap();
    assert_eq!(deletion.api_keys, 2);
    assert_eq!(deletion.requests, 3);

    assert!(store.get_user(owner.id).await.unwrap_err().is_not_found());
    assert!(store.get_api_key(key_a.id).await.unwrap_err().is_not_found());
    assert!(store.find_api_key(&key_b.key).await.unwrap().is_none());
    assert!(store.list_api_keys(owner.id).await.unwrap().is_empty());
    assert!(store.list_requests(owner.id).await.unwrap().is_empty());

    // Other users keep their rows
    assert_eq!(store.get_api_key(kept_key.id).await.unwrap(), kept_key);
    assert_eq!(store.list_requests(bystander.id).await.unwrap().len(), 1);

    let err = store.delete_user(owner.id).await.unwrap_err();
    assert!(err.is_not_found());
}

pub async fn referenced_role_cannot_be_deleted<S: Store>(store: &S) {
    let role = role(store).await;
    let member = user(store, &role).await;

    let err = store.delete_role(role.id).await.unwrap_err();
    assert!(
        err.is_foreign_key_violation(),
        "unexpected error: {err:?}"
    );
    assert_eq!(store.get_role(role.id).await.unwrap(), role);

    // Once unreferenced the role can go
    store.delete_user(member.id).await.unwrap();
    store.delete_role(role.id).await.unwrap();
    assert!(store.get_role(role.id).await.unwrap_err().is_not_found());
    assert!(store.delete_role(role.id).await.unwrap_err().is_not_found());
}

pub async fn first_upsert_creates_row<S: Store>(store: &S) {
    let ip = unique_ipv4();
    let fields = GeolocationFields {
        country: Some("US".into()),
        city: Some("Mountain View".into()),
        latitude: Some(37.386),
        longitude: Some(-122.0838),
        isp: Some("Example ISP".into()),
    };

    let record = store.upsert_geolocation(&ip, fields.clone()).await.unwrap();

    assert_eq!(record.ip_address, ip);
    assert_eq!(record.country, fields.country);
    assert_eq!(record.city, fields.city);
    assert_eq!(record.latitude, fields.latitude);
    assert_eq!(record.longitude, fields.longitude);
    assert_eq!(record.isp, fields.isp);
    assert_eq!(record.created_at, record.updated_at);
    assert_eq!(store.get_geolocation(&ip).await.unwrap(), record);
}

pub async fn repeated_upsert_refreshes_updated_at<S: Store>(store: &S) {
    let ip = unique_ipv4();
    let first = store
        .upsert_geolocation(
            &ip,
            GeolocationFields {
                country: Some("US".into()),
                city: Some("Old City".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let second = store
        .upsert_geolocation(
            &ip,
            GeolocationFields {
                country: Some("CA".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(second.id, first.id);
    assert_eq!(second.created_at, first.created_at);
    assert!(second.updated_at > first.updated_at);
    assert_eq!(second.country.as_deref(), Some("CA"));
    assert_eq!(second.city, None);

    let third = store
        .upsert_geolocation(&ip, GeolocationFields::default())
        .await
        .unwrap();
    assert!(third.updated_at > second.updated_at);
    assert_eq!(third.created_at, first.created_at);
}

pub async fn duplicate_geolocation_insert_is_rejected<S: Store>(store: &S) {
    let ip = unique_ipv4();
    store
        .insert_geolocation(&ip, GeolocationFields::default())
        .await
        .unwrap();

    let err = store
        .insert_geolocation(&ip, GeolocationFields::default())
        .await
        .unwrap_err();
    assert!(
        err.is_unique_violation_on(constraints::GEOLOCATION_IP_UNIQUE),
        "unexpected error: {err:?}"
    );
}

pub async fn addresses_are_normalized_and_linked<S: Store>(store: &S) {
    let v4 = unique_ipv4();
    let v4_record = store
        .upsert_geolocation(&v4, GeolocationFields::default())
        .await
        .unwrap();
    let v4_row = store
        .find_ip_address(IpFamily::V4, &v4)
        .await
        .unwrap()
        .expect("ipv4 row");
    assert_eq!(v4_record.ipv4_id, Some(v4_row.id));
    assert_eq!(v4_record.ipv6_id, None);

    // Upper-case spelling of the same IPv6 address
    let v6 = unique_ipv6();
    let shouted = v6.to_uppercase();
    let v6_record = store
        .upsert_geolocation(&shouted, GeolocationFields::default())
        .await
        .unwrap();
    let v6_row = store
        .find_ip_address(IpFamily::V6, &v6)
        .await
        .unwrap()
        .expect("ipv6 row");
    assert_eq!(v6_record.ip_address, shouted);
    assert_eq!(v6_record.ipv6_id, Some(v6_row.id));

    // Same canonical address under another spelling: the link stays one-to-one
    let other = store
        .upsert_geolocation(&v6, GeolocationFields::default())
        .await
        .unwrap();
    assert_eq!(other.ipv6_id, None);

    // Re-upserting the owner keeps its link
    let again = store
        .upsert_geolocation(&shouted, GeolocationFields::default())
        .await
        .unwrap();
    assert_eq!(again.ipv6_id, Some(v6_row.id));

    let text = store
        .upsert_geolocation(&unique("not-an-ip"), GeolocationFields::default())
        .await
        .unwrap();
    assert_eq!((text.ipv4_id, text.ipv6_id), (None, None));
}

pub async fn api_key_activation_toggles<S: Store>(store: &S) {
    let role = role(store).await;
    let owner = user(store, &role).await;
    let key = api_key_service::issue_api_key(store, owner.id).await.unwrap();
    assert!(key.active);
    assert_eq!(key.created_at, key.updated_at);

    let off = store.set_api_key_active(key.id, false).await.unwrap();
    assert!(!off.active);
    assert_eq!(off.created_at, key.created_at);
    assert!(off.updated_at > key.updated_at);

    let on = store.set_api_key_active(key.id, true).await.unwrap();
    assert!(on.active);
    assert!(on.updated_at > off.updated_at);

    let err = store
        .set_api_key_active(Uuid::new_v4(), true)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

pub async fn rate_limits_round_trip<S: Store>(store: &S) {
    let key = unique("rate");
    assert!(store.get_rate_limit(&key).await.unwrap().is_none());

    let stored = store.upsert_rate_limit(&key, 50, 60).await.unwrap();
    assert_eq!((stored.limit, stored.window_sec), (50, 60));
    assert_eq!(store.get_rate_limit(&key).await.unwrap(), Some(stored));

    store.delete_rate_limit(&key).await.unwrap();
    assert!(store.get_rate_limit(&key).await.unwrap().is_none());
    assert!(store.delete_rate_limit(&key).await.unwrap_err().is_not_found());
}

/// Create admin role, user, key; delete the user; the key is gone.
pub async fn deleted_user_key_lookup_is_not_found<S: Store>(store: &S) {
    let admin = store.create_role(&unique("admin")).await.unwrap();
    let a = store
        .create_user(NewUser {
            email: unique_email(),
            password_hash: "hash".into(),
            role_id: admin.id,
        })
        .await
        .unwrap();
    let key = store.create_api_key(a.id).await.unwrap();

    store.delete_user(a.id).await.unwrap();

    let err = store.get_api_key(key.id).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
}
