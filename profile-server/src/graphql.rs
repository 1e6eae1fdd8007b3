//! The GraphQL schema: resolvers for the profile queries, mutations and subscriptions.

use std::{future::Future, sync::Arc};

use async_graphql::{ErrorExtensions, ID, Schema};
use tracing::{Instrument, debug_span, warn};

use crate::{
    bus::NotificationBus,
    context::RequestContext,
    profile::ProfileId,
    store::ProfileStore,
};

pub use self::{
    error::{ApiError, ErrorCode},
    mutation::MutationRoot,
    query::QueryRoot,
    subscription::{ProfileStream, SubscriptionRoot},
    types::ProfileInput,
};

mod error;
mod mutation;
mod query;
mod subscription;
mod types;

/// The full GraphQL schema type.
pub type ProfileSchema = Schema<QueryRoot, MutationRoot, SubscriptionRoot>;

/// Build the schema with the store and bus injected.
///
/// Both are shared by every request the schema executes.
pub fn build_schema(store: Arc<dyn ProfileStore>, bus: NotificationBus) -> ProfileSchema {
    Schema::build(QueryRoot, MutationRoot, SubscriptionRoot)
        .data(store)
        .data(bus)
        .finish()
}

fn parse_id(id: &ID) -> Result<ProfileId, ApiError> {
    Ok(id.parse::<ProfileId>()?)
}

/// Run a resolver body in a span naming the operation and the caller, and turn its
/// failure into a GraphQL error carrying the error code.
async fn resolve<T>(
    op: &'static str,
    rc: &RequestContext<'_>,
    fut: impl Future<Output = Result<T, ApiError>>,
) -> async_graphql::Result<T> {
    let span = debug_span!("resolve", op, subject = rc.auth.subject().unwrap_or("anonymous"));
    fut.instrument(span).await.map_err(|err| {
        warn!(op, code = %err.code(), "{err}");
        err.extend()
    })
}

#[cfg(test)]
mod tests {
    use std::{pin::pin, time::Duration};

    use async_trait::async_trait;
    use n0_snafu::{Result, ResultExt};
    use serde_json::{Value, json};
    use tokio_stream::StreamExt;
    use tracing_test::traced_test;

    use super::*;
    use crate::{
        bus::Topic,
        profile::{Profile, ProfileFields},
        store::{ProfileCollection, StoreError, StoreResult},
    };

    fn setup() -> Result<(ProfileSchema, NotificationBus)> {
        let store = ProfileCollection::in_memory().e()?;
        let bus = NotificationBus::default();
        Ok((build_schema(Arc::new(store), bus.clone()), bus))
    }

    async fn execute(schema: &ProfileSchema, query: impl Into<String>) -> Value {
        let response = schema.execute(query.into()).await;
        serde_json::to_value(&response).expect("response serializes")
    }

    fn error_code(response: &Value) -> &str {
        response["errors"][0]["extensions"]["code"]
            .as_str()
            .unwrap_or_default()
    }

    async fn create(schema: &ProfileSchema, pnc: &str, elc: &str, cpv: &str) -> Value {
        let query = format!(
            r#"mutation {{ profileCreate(profile: {{ pnc: "{pnc}", elc: "{elc}", cpv: "{cpv}" }}) {{ id pnc elc cpv }} }}"#
        );
        let response = execute(schema, query).await;
        assert!(response.get("errors").is_none(), "{response}");
        response["data"]["profileCreate"].clone()
    }

    #[test]
    fn sdl_matches_the_profile_api() -> Result {
        let (schema, _bus) = setup()?;
        let sdl = schema.sdl();
        for line in [
            "type Profile {",
            "id: ID!",
            "pnc: String!",
            "input ProfileInput {",
            "profileById(id: ID!): Profile!",
            "profileByPnc(pnc: String!): Profile!",
            "profileCreate(profile: ProfileInput): Profile!",
            "profileDelete(id: ID!): Boolean!",
            "profileUpdate(id: ID!, profile: ProfileInput): Profile!",
            "profileAdded: Profile",
            "profileUpdated: Profile",
        ] {
            assert!(sdl.contains(line), "missing `{line}` in\n{sdl}");
        }
        assert!(!sdl.contains("profileAdded: Profile!"));
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn create_then_read_by_id_and_pnc() -> Result {
        let (schema, _bus) = setup()?;
        let created = create(&schema, "P1", "E1", "C1").await;
        let id = created["id"].as_str().unwrap_or_default().to_string();
        assert_eq!(id.len(), 24);

        let response = execute(
            &schema,
            format!(r#"{{ profileById(id: "{id}") {{ id pnc elc cpv }} }}"#),
        )
        .await;
        assert_eq!(response["data"]["profileById"], created);

        let response = execute(&schema, r#"{ profileByPnc(pnc: "P1") { id elc } }"#).await;
        assert_eq!(
            response["data"]["profileByPnc"],
            json!({ "id": id, "elc": "E1" })
        );
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn update_replaces_fields_and_keeps_id() -> Result {
        let (schema, _bus) = setup()?;
        let created = create(&schema, "P1", "E1", "C1").await;
        let id = created["id"].as_str().unwrap_or_default();

        let response = execute(
            &schema,
            format!(
                r#"mutation {{ profileUpdate(id: "{id}", profile: {{ pnc: "P1", elc: "E2", cpv: "C1" }}) {{ id elc }} }}"#
            ),
        )
        .await;
        assert_eq!(
            response["data"]["profileUpdate"],
            json!({ "id": id, "elc": "E2" })
        );

        let response = execute(
            &schema,
            format!(r#"{{ profileById(id: "{id}") {{ elc }} }}"#),
        )
        .await;
        assert_eq!(response["data"]["profileById"]["elc"], "E2");
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn unknown_profiles_are_not_found() -> Result {
        let (schema, _bus) = setup()?;
        let id = ProfileId::generate();

        let response = execute(&schema, r#"{ profileByPnc(pnc: "nope") { id } }"#).await;
        assert_eq!(error_code(&response), "NOT_FOUND");
        assert_eq!(response["data"], Value::Null);

        let response = execute(
            &schema,
            format!(r#"{{ profileById(id: "{id}") {{ id }} }}"#),
        )
        .await;
        assert_eq!(error_code(&response), "NOT_FOUND");

        let response = execute(
            &schema,
            format!(
                r#"mutation {{ profileUpdate(id: "{id}", profile: {{ pnc: "a", elc: "b", cpv: "c" }}) {{ id }} }}"#
            ),
        )
        .await;
        assert_eq!(error_code(&response), "NOT_FOUND");
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn malformed_requests_are_validation_errors() -> Result {
        let (schema, _bus) = setup()?;

        let response = execute(&schema, r#"{ profileById(id: "not-an-id") { id } }"#).await;
        assert_eq!(error_code(&response), "VALIDATION");

        let response = execute(&schema, "mutation { profileCreate { id } }").await;
        assert_eq!(error_code(&response), "VALIDATION");
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn delete_removes_the_profile() -> Result {
        let (schema, _bus) = setup()?;
        let created = create(&schema, "P1", "E1", "C1").await;
        let id = created["id"].as_str().unwrap_or_default();
        let delete = format!(r#"mutation {{ profileDelete(id: "{id}") }}"#);

        let response = execute(&schema, delete.clone()).await;
        assert_eq!(response["data"]["profileDelete"], true);

        let response = execute(
            &schema,
            format!(r#"{{ profileById(id: "{id}") {{ id }} }}"#),
        )
        .await;
        assert_eq!(error_code(&response), "NOT_FOUND");

        let response = execute(&schema, delete).await;
        assert_eq!(response["data"]["profileDelete"], false);
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn mutations_publish_on_the_bus() -> Result {
        let (schema, bus) = setup()?;
        let mut added = bus.subscribe(Topic::ProfileAdded);
        let mut updated = bus.subscribe(Topic::ProfileUpdated);

        let created = create(&schema, "P1", "E1", "C1").await;
        let id = created["id"].as_str().unwrap_or_default();
        let event = added.next().await.expect("added event");
        assert_eq!(event.topic, Topic::ProfileAdded);
        assert_eq!(event.profile.id.to_string(), id);

        execute(
            &schema,
            format!(
                r#"mutation {{ profileUpdate(id: "{id}", profile: {{ pnc: "P1", elc: "E2", cpv: "C1" }}) {{ id }} }}"#
            ),
        )
        .await;
        let event = updated.next().await.expect("updated event");
        assert_eq!(event.topic, Topic::ProfileUpdated);
        assert_eq!(event.profile.elc, "E2");

        execute(&schema, format!(r#"mutation {{ profileDelete(id: "{id}") }}"#)).await;
        let nothing = tokio::time::timeout(Duration::from_millis(50), added.next()).await;
        assert!(nothing.is_err(), "delete must not publish");
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn subscription_receives_created_profile() -> Result {
        let (schema, bus) = setup()?;
        let mut stream = pin!(schema.execute_stream("subscription { profileAdded { pnc elc cpv } }"));

        let produce = async {
            while bus.subscriber_count(Topic::ProfileAdded) == 0 {
                tokio::task::yield_now().await;
            }
            create(&schema, "P2", "E", "C").await
        };
        let (event, _created) = tokio::time::timeout(
            Duration::from_secs(5),
            async { tokio::join!(stream.next(), produce) },
        )
        .await
        .e()?;

        let event = event.expect("subscription ended");
        let event = serde_json::to_value(&event).e()?;
        assert_eq!(
            event["data"]["profileAdded"],
            json!({ "pnc": "P2", "elc": "E", "cpv": "C" })
        );
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn subscription_receives_updated_profile() -> Result {
        let (schema, bus) = setup()?;
        let created = create(&schema, "P1", "E1", "C1").await;
        let id = created["id"].as_str().unwrap_or_default().to_string();
        let mut stream = pin!(schema.execute_stream("subscription { profileUpdated { id elc } }"));

        let produce = async {
            while bus.subscriber_count(Topic::ProfileUpdated) == 0 {
                tokio::task::yield_now().await;
            }
            execute(
                &schema,
                format!(
                    r#"mutation {{ profileUpdate(id: "{id}", profile: {{ pnc: "P1", elc: "E9", cpv: "C1" }}) {{ id }} }}"#
                ),
            )
            .await
        };
        let (event, _) = tokio::time::timeout(
            Duration::from_secs(5),
            async { tokio::join!(stream.next(), produce) },
        )
        .await
        .e()?;

        let event = serde_json::to_value(&event.expect("subscription ended")).e()?;
        assert_eq!(
            event["data"]["profileUpdated"],
            json!({ "id": id, "elc": "E9" })
        );
        Ok(())
    }

    /// A store whose every operation times out.
    #[derive(Debug)]
    struct StalledStore;

    impl StalledStore {
        fn stalled<T>(op: &'static str) -> StoreResult<T> {
            Err(StoreError::Timeout {
                op,
                after: Duration::from_millis(1),
            })
        }
    }

    #[async_trait]
    impl ProfileStore for StalledStore {
        async fn find_by_id(&self, _id: ProfileId) -> StoreResult<Profile> {
            Self::stalled("find_by_id")
        }
        async fn find_by_pnc(&self, _pnc: &str) -> StoreResult<Profile> {
            Self::stalled("find_by_pnc")
        }
        async fn create(&self, _fields: ProfileFields) -> StoreResult<Profile> {
            Self::stalled("create")
        }
        async fn update(&self, _id: ProfileId, _fields: ProfileFields) -> StoreResult<Profile> {
            Self::stalled("update")
        }
        async fn delete(&self, _id: ProfileId) -> StoreResult<bool> {
            Self::stalled("delete")
        }
        async fn count(&self) -> StoreResult<u64> {
            Self::stalled("count")
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn storage_failures_are_surfaced() -> Result {
        let bus = NotificationBus::default();
        let mut added = bus.subscribe(Topic::ProfileAdded);
        let schema = build_schema(Arc::new(StalledStore), bus.clone());

        let response = execute(&schema, r#"{ profileByPnc(pnc: "P1") { id } }"#).await;
        assert_eq!(error_code(&response), "STORAGE");

        let response = execute(
            &schema,
            r#"mutation { profileCreate(profile: { pnc: "a", elc: "b", cpv: "c" }) { id } }"#,
        )
        .await;
        assert_eq!(error_code(&response), "STORAGE");
        let nothing = tokio::time::timeout(Duration::from_millis(50), added.next()).await;
        assert!(nothing.is_err(), "failed writes must not publish");
        Ok(())
    }
}
