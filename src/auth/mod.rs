//! Authentication and session management.
//!
//! A session is two halves: an RS256-signed bearer token held by the client
//! and a `token_record` row held by the server. The signature proves the
//! claims are genuine; the row lets the server end the session before the
//! signed `exp` passes.
//!
//! ## Flow
//!
//! - [`TokenIssuer`] signs claims for a [`Principal`] and stores the record
//!   before handing the token out.
//! - [`TokenValidator`] checks structure, signature, the signed time window
//!   and finally the record, in that order.
//! - [`AuthGate`] pulls the bearer credential off a request, validates it,
//!   resolves the principal and applies a [`GatePolicy`].
//! - [`SessionTerminator`] backdates the expiry of the principal's newest
//!   record on logout.
//!
//! ## Usage
//!
//! ```ignore
//! let principal = gate
//!     .authenticate_headers(&headers, GatePolicy::Admin)
//!     .await?;
//! terminator.invalidate(&principal).await?;
//! ```

mod claims;
mod context;
mod error;
mod gate;
mod issuer;
mod keys;
mod session;
mod token_store;
mod user_store;
mod validator;

#[cfg(test)]
mod integration_tests;

#[cfg(test)]
pub(crate) use keys::test_keys;

pub use claims::SessionClaims;
pub use context::Principal;
pub use error::AuthError;
pub use gate::{AuthGate, GatePolicy};
pub use issuer::{IssuedToken, TokenIssuer};
pub use keys::{KeyMaterial, SIGNING_ALGORITHM, VerifyingKey};
pub use session::SessionTerminator;
pub use token_store::{SurrealTokenStore, TokenRecordStore};
pub use user_store::{NewUser, PrincipalDirectory, UserStore, UserStoreError, UserUpdate};
pub use validator::{TokenValidator, ValidatedSession};
