use std::error::Error as StdError;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::*;

use redirect_auth::error::{Error as AuthError, ErrorKind, HttpErrorKind, ProviderErrorKind};
use redirect_auth::oauth::Rejection;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// Issuing an authorization URL failed.
    Auth(AuthError),
    /// A redirect callback was not accepted.
    Rejected(Rejection),
}

impl StdError for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> core::result::Result<(), std::fmt::Error> {
        match self {
            Error::Auth(err) => write!(fmt, "{err}"),
            Error::Rejected(rejection) => write!(fmt, "callback rejected: {rejection}"),
        }
    }
}

// Response bodies carry only the status text. Details go to the log.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::Rejected(rejection) => {
                debug!("Responding 400 to rejected callback: {}", rejection);
                (StatusCode::BAD_REQUEST, rejection.public_message()).into_response()
            }
            Error::Auth(err) => match err.error_kind {
                ErrorKind::Provider(ProviderErrorKind::NotFound) => {
                    (StatusCode::NOT_FOUND, "NOT FOUND").into_response()
                }
                ErrorKind::Metadata(_) | ErrorKind::Http(HttpErrorKind::Network) => {
                    (StatusCode::BAD_GATEWAY, "BAD GATEWAY").into_response()
                }
                _ => {
                    error!("Internal error while issuing authorization URL: {}", err);
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL SERVER ERROR").into_response()
                }
            },
        }
    }
}

impl From<AuthError> for Error {
    fn from(err: AuthError) -> Self {
        Self::Auth(err)
    }
}

impl From<Rejection> for Error {
    fn from(rejection: Rejection) -> Self {
        Self::Rejected(rejection)
    }
}
