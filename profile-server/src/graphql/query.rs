use async_graphql::{Context, ID, Object, Result};

use super::{ApiError, parse_id, resolve};
use crate::{context::RequestContext, profile::Profile};

/// Read operations.
#[derive(Debug, Default)]
pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// Fetch a profile by id.
    async fn profile_by_id(&self, ctx: &Context<'_>, id: ID) -> Result<Profile> {
        let rc = RequestContext::from_ctx(ctx)?;
        resolve("profileById", &rc, async {
            let id = parse_id(&id)?;
            Ok::<_, ApiError>(rc.store.find_by_id(id).await?)
        })
        .await
    }

    /// Fetch the earliest created profile with the given `pnc`.
    async fn profile_by_pnc(&self, ctx: &Context<'_>, pnc: String) -> Result<Profile> {
        let rc = RequestContext::from_ctx(ctx)?;
        resolve("profileByPnc", &rc, async {
            Ok::<_, ApiError>(rc.store.find_by_pnc(&pnc).await?)
        })
        .await
    }
}
