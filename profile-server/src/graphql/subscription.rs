use std::pin::Pin;

use async_graphql::{Context, Result, Subscription};
use tokio_stream::{Stream, StreamExt};
use tracing::debug;

use crate::{bus::Topic, context::RequestContext, profile::Profile};

/// Stream returned by the subscription resolvers.
pub type ProfileStream = Pin<Box<dyn Stream<Item = Option<Profile>> + Send>>;

/// Push notifications.
///
/// Streams only carry events published after the subscription started.
#[derive(Debug, Default)]
pub struct SubscriptionRoot;

#[Subscription]
impl SubscriptionRoot {
    /// Every profile created from now on.
    async fn profile_added(&self, ctx: &Context<'_>) -> Result<ProfileStream> {
        subscribe(ctx, Topic::ProfileAdded)
    }

    /// Every profile updated from now on.
    async fn profile_updated(&self, ctx: &Context<'_>) -> Result<ProfileStream> {
        subscribe(ctx, Topic::ProfileUpdated)
    }
}

fn subscribe(ctx: &Context<'_>, topic: Topic) -> Result<ProfileStream> {
    let rc = RequestContext::from_ctx(ctx)?;
    debug!(%topic, subject = rc.auth.subject().unwrap_or("anonymous"), "subscription started");
    Ok(Box::pin(rc.bus.subscribe(topic).map(|event| Some(event.profile))))
}
