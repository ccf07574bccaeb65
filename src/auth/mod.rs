//! Credentials attached to outbound requests.
//!
//! A [`Credential`] is read by every request and replaced only by the rate monitor when an
//! installation token is refreshed through a [`TokenIssuer`].

mod app;
mod credential;

pub use app::{InstallationTokenIssuer, TokenIssuer};
pub use credential::Credential;
