use crate::{auth::AuthState, csrf::CsrfToken, requests::HttpTransport};

/// Everything one logged-in run shares: the transport (and the cookie jar
/// behind it), the current CSRF token and where the login protocol stands.
///
/// Not meant to be shared between two logins.
pub struct Session<T: HttpTransport> {
    pub transport: T,
    pub csrf: CsrfToken,
    pub state: AuthState,
}

impl<T: HttpTransport> Session<T> {
    pub fn new(transport: T) -> Self {
        Session {
            transport,
            csrf: CsrfToken::default(),
            state: AuthState::Unauthenticated,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == AuthState::Authenticated
    }
}
