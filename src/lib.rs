pub mod auth;
pub mod config;
pub mod confessions;
pub mod db;
pub mod location;
pub mod remote;

use std::fmt;

use serde_json::Value;
use thiserror::Error;

pub use auth::{IdentityEvent, SessionState, SessionStore};
pub use confessions::{ConfessionThread, FeedState, FeedSync, ThreadState};
pub use db::{Comment, Confession, Identity, NewComment, NewConfession, Profile};
pub use location::{Location, pick_location};

/// Longest confession the client will submit, in characters.
pub const MAX_CONFESSION_LEN: usize = 500;

pub trait GetField {
    fn get_str_field(&self, field: &str) -> AppResult<String>;
    fn get_obj_field(&self, field: &str) -> AppResult<&Value>;
}

impl GetField for serde_json::Value {
    fn get_str_field(&self, field: &str) -> AppResult<String> {
        Ok(
            self.get(field)
            .ok_or(format!("expected {field} in {self}"))?
            .as_str()
            .ok_or(format!("expected {field} in {self} to be string"))?
            .to_owned()
        )
    }

    fn get_obj_field(&self, field: &str) -> AppResult<&Value> {
        self.get(field)
        .filter(|value| value.is_object())
        .ok_or(format!("expected {field} in {self}").into())
    }
}

/// Local precondition failures, checked before any remote call is issued.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Rejected {
    #[error("You must be logged in to {0}")]
    NotAuthenticated(&'static str),

    #[error("You can only post one confession per day")]
    NotEligible,

    #[error("Please enter your {0}")]
    EmptyContent(&'static str),

    #[error("Confessions are limited to {max} characters")]
    TooLong { max: usize },

    #[error("Please fill in all fields")]
    MissingCredentials,
}

pub type AppResult<T> = Result<T, AppError>;
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    /// The local precondition behind this error, if it never reached the remote side.
    pub fn rejection(&self) -> Option<&Rejected> {
        self.0.downcast_ref::<Rejected>()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for AppError {
    fn from(err: String) -> Self {
        Self(anyhow::Error::msg(err))
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        Self(anyhow::Error::msg(err.to_owned()))
    }
}

macro_rules! apperr_impl {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self(anyhow::Error::from(err))
            }
        }
    };
}

apperr_impl!(Rejected);
apperr_impl!(serde_json::Error);
apperr_impl!(reqwest::Error);
apperr_impl!(url::ParseError);
