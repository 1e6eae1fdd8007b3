use async_graphql::{Context, ID, Object, Result};

use super::{ApiError, error::require_input, parse_id, resolve, types::ProfileInput};
use crate::{bus::Topic, context::RequestContext, profile::Profile};

/// Write operations.
///
/// Every successful create or update is announced on the notification bus before the
/// written profile is returned.
#[derive(Debug, Default)]
pub struct MutationRoot;

#[Object]
impl MutationRoot {
    /// Store a new profile.
    async fn profile_create(
        &self,
        ctx: &Context<'_>,
        profile: Option<ProfileInput>,
    ) -> Result<Profile> {
        let rc = RequestContext::from_ctx(ctx)?;
        resolve("profileCreate", &rc, async {
            let fields = require_input(profile)?;
            let created = rc.store.create(fields).await?;
            rc.bus.publish(Topic::ProfileAdded, created.clone());
            Ok::<_, ApiError>(created)
        })
        .await
    }

    /// Remove a profile. Returns false if there was none.
    async fn profile_delete(&self, ctx: &Context<'_>, id: ID) -> Result<bool> {
        let rc = RequestContext::from_ctx(ctx)?;
        resolve("profileDelete", &rc, async {
            let id = parse_id(&id)?;
            Ok::<_, ApiError>(rc.store.delete(id).await?)
        })
        .await
    }

    /// Replace the content fields of an existing profile.
    async fn profile_update(
        &self,
        ctx: &Context<'_>,
        id: ID,
        profile: Option<ProfileInput>,
    ) -> Result<Profile> {
        let rc = RequestContext::from_ctx(ctx)?;
        resolve("profileUpdate", &rc, async {
            let id = parse_id(&id)?;
            let fields = require_input(profile)?;
            let updated = rc.store.update(id, fields).await?;
            rc.bus.publish(Topic::ProfileUpdated, updated.clone());
            Ok::<_, ApiError>(updated)
        })
        .await
    }
}
