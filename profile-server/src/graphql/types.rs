//! GraphQL object and input types.

use async_graphql::{ID, InputObject, Object};

use crate::profile::{Profile, ProfileFields};

#[Object]
impl Profile {
    /// Identifier assigned by the store, 24 hex characters.
    async fn id(&self) -> ID {
        ID(self.id.to_string())
    }

    async fn pnc(&self) -> &str {
        &self.pnc
    }

    async fn elc(&self) -> &str {
        &self.elc
    }

    async fn cpv(&self) -> &str {
        &self.cpv
    }
}

/// Content fields for creating or replacing a profile.
#[derive(Debug, Clone, InputObject)]
pub struct ProfileInput {
    /// Alternate lookup key.
    pub pnc: String,
    /// Opaque string field.
    pub elc: String,
    /// Opaque string field.
    pub cpv: String,
}

impl From<ProfileInput> for ProfileFields {
    fn from(input: ProfileInput) -> Self {
        let ProfileInput { pnc, elc, cpv } = input;
        ProfileFields { pnc, elc, cpv }
    }
}
