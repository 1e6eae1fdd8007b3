//! Per-request context handed to the resolvers.

use std::{collections::BTreeSet, sync::Arc};

use async_graphql::Context;
use http::{HeaderMap, header::AUTHORIZATION};
use tracing::debug;

use crate::{bus::NotificationBus, store::ProfileStore};

static ANONYMOUS: AuthContext = AuthContext {
    subject: None,
    scopes: BTreeSet::new(),
};

/// Identity of the caller of a request.
///
/// Carried through every resolver call. Nothing is enforced based on it yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthContext {
    subject: Option<String>,
    scopes: BTreeSet<String>,
}

impl AuthContext {
    /// A caller without identity or scopes.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// An identified caller.
    pub fn new(subject: impl Into<String>, scopes: impl IntoIterator<Item = String>) -> Self {
        Self {
            subject: Some(subject.into()),
            scopes: scopes.into_iter().collect(),
        }
    }

    /// The identified subject, if any.
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// The granted scopes.
    pub fn scopes(&self) -> &BTreeSet<String> {
        &self.scopes
    }

    /// Whether `scope` was granted.
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }

    /// Whether the caller has no identity.
    pub fn is_anonymous(&self) -> bool {
        self.subject.is_none()
    }
}

/// Builds the [`AuthContext`] for an incoming request.
///
/// Runs once per HTTP request and once per WebSocket connection. Credentials are not
/// parsed, every caller is anonymous.
#[derive(Debug, Clone, Default)]
pub struct ContextBuilder {}

impl ContextBuilder {
    /// Derive the caller identity from the request headers.
    pub fn build(&self, headers: &HeaderMap) -> AuthContext {
        if headers.contains_key(AUTHORIZATION) {
            debug!("ignoring authorization header, treating caller as anonymous");
        }
        AuthContext::anonymous()
    }
}

/// The dependencies of a single resolver call.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    /// Storage handle, shared by all requests.
    pub store: &'a Arc<dyn ProfileStore>,
    /// Notification bus, shared by all requests.
    pub bus: &'a NotificationBus,
    /// Caller identity of this request.
    pub auth: &'a AuthContext,
}

impl<'a> RequestContext<'a> {
    /// Collect the dependencies from the GraphQL context.
    ///
    /// Fails if the schema was built without a store or bus. A request executed without
    /// an [`AuthContext`] is treated as anonymous.
    pub fn from_ctx(ctx: &Context<'a>) -> async_graphql::Result<Self> {
        Ok(Self {
            store: ctx.data::<Arc<dyn ProfileStore>>()?,
            bus: ctx.data::<NotificationBus>()?,
            auth: ctx.data_opt::<AuthContext>().unwrap_or(&ANONYMOUS),
        })
    }
}
