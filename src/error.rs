use thiserror::Error;

/// Something a human has to do on the portal before a run can succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    AcceptCgu,
    EnterOtp,
}

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("login failed: {0}")]
    LoginFailed(String),

    #[error("account locked after too many attempts")]
    TooManyAttempts,

    #[error("the portal reports an outage: {0}")]
    VendorDown(String),

    #[error("user action needed: {0:?}")]
    UserActionNeeded(UserAction),

    #[error("unexpected page content: {0}")]
    ParseAnomaly(String),
}

impl ConnectorError {
    /// Only transport failures are worth retrying; everything else is a verdict from the portal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ConnectorError::Network(_))
    }

    /// The error code understood by the hosting harness.
    pub fn code(&self) -> &'static str {
        match self {
            ConnectorError::Network(_) => "UNKNOWN_ERROR",
            ConnectorError::LoginFailed(_) => "LOGIN_FAILED",
            ConnectorError::TooManyAttempts => "LOGIN_FAILED.TOO_MANY_ATTEMPTS",
            ConnectorError::VendorDown(_) => "VENDOR_DOWN",
            ConnectorError::UserActionNeeded(UserAction::AcceptCgu) => "USER_ACTION_NEEDED.CGU_FORM",
            ConnectorError::UserActionNeeded(UserAction::EnterOtp) => "USER_ACTION_NEEDED.OTP",
            ConnectorError::ParseAnomaly(_) => "UNKNOWN_ERROR",
        }
    }
}

pub type ConnectorResult<T> = Result<T, ConnectorError>;
