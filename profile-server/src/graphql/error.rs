//! Errors surfaced to GraphQL clients.

use async_graphql::ErrorExtensions;
use snafu::{OptionExt, Snafu};

use super::types::ProfileInput;
use crate::{
    profile::{InvalidProfileId, ProfileFields},
    store::StoreError,
};

/// Machine readable error class, sent as `extensions.code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// No profile matches the request.
    NotFound,
    /// The request is malformed.
    Validation,
    /// The store failed or did not answer in time.
    Storage,
}

/// A failed resolver call.
#[allow(missing_docs)]
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ApiError {
    #[snafu(display("{message}"))]
    NotFound { message: String },
    #[snafu(display("{message}"))]
    Validation { message: String },
    #[snafu(display("storage unavailable: {source}"))]
    Storage { source: StoreError },
}

impl ApiError {
    /// The error class reported to the client.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::Validation { .. } => ErrorCode::Validation,
            Self::Storage { .. } => ErrorCode::Storage,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(source: StoreError) -> Self {
        if source.is_not_found() {
            Self::NotFound {
                message: source.to_string(),
            }
        } else {
            Self::Storage { source }
        }
    }
}

impl From<InvalidProfileId> for ApiError {
    fn from(err: InvalidProfileId) -> Self {
        Self::Validation {
            message: err.to_string(),
        }
    }
}

impl ErrorExtensions for ApiError {
    fn extend(&self) -> async_graphql::Error {
        async_graphql::Error::new(self.to_string())
            .extend_with(|_, ext| ext.set("code", self.code().as_ref()))
    }
}

/// The payload of a create or update, which the schema declares nullable.
pub(crate) fn require_input(input: Option<ProfileInput>) -> Result<ProfileFields, ApiError> {
    input.map(ProfileFields::from).context(ValidationSnafu {
        message: "argument `profile` is required",
    })
}
