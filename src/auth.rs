//! The login protocol: cookie bootstrap, credential submit, optional one-time
//! code, then a verdict read off whatever page the portal answers with.

use async_trait::async_trait;
use log::{debug, error, info, warn};
use scraper::Html;

use crate::{
    error::{ConnectorError, ConnectorResult, UserAction},
    requests::HttpTransport,
    session::Session,
    text_manipulators::{clean_text, selector},
    urls,
};

/// Social security numbers are 13 digits; a 15-character login carries the key.
const LOGIN_LENGTH: usize = 13;
const OTP_LENGTH: usize = 6;

const DISCONNECT_SELECTOR: &str = r#"[title="Déconnexion du compte ameli"]"#;
const OTP_MARKER_SELECTOR: &str = "#formOTP, input[name^=codeOTP]";
const REFRESH_SELECTOR: &str = "meta[http-equiv=refresh]";
const ERRORS_SELECTOR: &str = "#r_errors";
const HEADING_SELECTOR: &str = ".centrepage h2, h1, h2";
const LOGIN_FORM_SELECTOR: &str = "input[name=connexioncompte_2numSecuriteSociale]";
const CGU_PAGE: &str = "as_conditions_generales_page";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    CookieBootstrapped,
    CredentialsSubmitted,
    Authenticated,
    OtpRequired,
    AwaitingUserCode,
    CguRequired,
    Blocked,
    VendorDown,
    LoginFailed,
}

/// What a page returned by a login step says about the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginPage {
    Authenticated,
    OtpRequired,
    CguRequired,
    Blocked,
    VendorDown(String),
    LoginFailed(String),
}

impl LoginPage {
    fn state(&self) -> AuthState {
        match self {
            LoginPage::Authenticated => AuthState::Authenticated,
            LoginPage::OtpRequired => AuthState::OtpRequired,
            LoginPage::CguRequired => AuthState::CguRequired,
            LoginPage::Blocked => AuthState::Blocked,
            LoginPage::VendorDown(_) => AuthState::VendorDown,
            LoginPage::LoginFailed(_) => AuthState::LoginFailed,
        }
    }

    /// Terminal verdicts as errors; `Authenticated` and `OtpRequired` are not errors.
    fn into_error(self) -> Option<ConnectorError> {
        match self {
            LoginPage::Authenticated | LoginPage::OtpRequired => None,
            LoginPage::CguRequired => Some(ConnectorError::UserActionNeeded(UserAction::AcceptCgu)),
            LoginPage::Blocked => Some(ConnectorError::TooManyAttempts),
            LoginPage::VendorDown(message) => Some(ConnectorError::VendorDown(message)),
            LoginPage::LoginFailed(message) => Some(ConnectorError::LoginFailed(message)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

/// Supplies the one-time code the portal e-mails to the account holder.
///
/// Implementations may wait on a human for as long as it takes.
#[async_trait]
pub trait OtpProvider: Send + Sync {
    async fn otp_code(&self) -> ConnectorResult<String>;
}

/// Trims the login and cuts it down to a bare social security number.
pub fn normalize_login(login: &str) -> ConnectorResult<String> {
    let trimmed = login.trim();
    let length = trimmed.chars().count();
    if length < LOGIN_LENGTH {
        debug!("Bad login length: {length}");
        return Err(ConnectorError::LoginFailed(format!(
            "login must be at least {LOGIN_LENGTH} characters"
        )));
    }
    if length > LOGIN_LENGTH {
        debug!("Fixed the login length to {LOGIN_LENGTH}");
    }
    Ok(trimmed.chars().take(LOGIN_LENGTH).collect())
}

fn validate_otp(code: &str) -> ConnectorResult<&str> {
    let code = code.trim();
    if code.len() == OTP_LENGTH && code.chars().all(|c| c.is_ascii_digit()) {
        Ok(code)
    } else {
        Err(ConnectorError::LoginFailed(format!("the code must be {OTP_LENGTH} digits")))
    }
}

fn has_disconnect_control(document: &Html) -> bool {
    document.select(&selector(DISCONNECT_SELECTOR)).next().is_some()
}

/// Reads the verdict off the page the portal answered a credential submit with.
///
/// Anything not positively recognised is a failed login.
pub fn classify_login_page(html: &str) -> LoginPage {
    let document = Html::parse_document(html);

    if has_disconnect_control(&document) {
        return LoginPage::Authenticated;
    }
    if document.select(&selector(OTP_MARKER_SELECTOR)).next().is_some() {
        return LoginPage::OtpRequired;
    }
    let cgu_redirect = document
        .select(&selector(REFRESH_SELECTOR))
        .filter_map(|meta| meta.value().attr("content"))
        .any(|content| content.contains(CGU_PAGE));
    if cgu_redirect {
        return LoginPage::CguRequired;
    }

    let headings: Vec<String> = document
        .select(&selector(HEADING_SELECTOR))
        .map(clean_text)
        .filter(|text| !text.is_empty())
        .collect();
    for heading in &headings {
        let lowered = heading.to_lowercase();
        if lowered.contains("bloqué") {
            return LoginPage::Blocked;
        }
        if lowered.contains("indisponible") {
            return LoginPage::VendorDown(heading.clone());
        }
    }

    if let Some(errors) = document.select(&selector(ERRORS_SELECTOR)).next() {
        let message = clean_text(errors);
        debug!("These errors were found on screen: {message}");
        return LoginPage::LoginFailed(message);
    }

    LoginPage::LoginFailed("unrecognised page after login".into())
}

impl<T: HttpTransport> Session<T> {
    /// Unauthenticated GET whose only purpose is to collect session cookies.
    pub async fn bootstrap(&mut self) -> ConnectorResult<()> {
        self.transport.get(&urls::login_url()).await?;
        self.state = AuthState::CookieBootstrapped;
        Ok(())
    }

    pub async fn submit_credentials(&mut self, credentials: &Credentials) -> ConnectorResult<LoginPage> {
        let login = normalize_login(&credentials.login)?;
        let form = [
            ("connexioncompte_2numSecuriteSociale", login.as_str()),
            ("connexioncompte_2codeConfidentiel", credentials.password.as_str()),
            ("connexioncompte_2actionEvt", "connecter"),
            ("submit", "Valider"),
        ];
        self.state = AuthState::CredentialsSubmitted;
        let body = self.transport.post(&urls::submit_url(), &[], &form).await?;

        let page = classify_login_page(&body);
        if matches!(page, LoginPage::LoginFailed(_)) {
            debug!("No disconnect link found in the page after login");
        }
        self.state = page.state();
        Ok(page)
    }

    /// Each digit of the code goes in its own field.
    pub async fn submit_otp(&mut self, code: &str) -> ConnectorResult<LoginPage> {
        if !matches!(self.state, AuthState::OtpRequired | AuthState::AwaitingUserCode) {
            return Err(ConnectorError::LoginFailed(format!(
                "no code was requested (state {:?})",
                self.state
            )));
        }
        let code = validate_otp(code)?;
        let names: Vec<String> = (1..=OTP_LENGTH).map(|i| format!("codeOTP{i}")).collect();
        let digits: Vec<String> = code.chars().map(String::from).collect();
        let mut form: Vec<(&str, &str)> = names
            .iter()
            .zip(digits.iter())
            .map(|(name, digit)| (name.as_str(), digit.as_str()))
            .collect();
        form.push(("connexioncompte_2actionEvt", "validerOTP"));

        let body = self.transport.post(&urls::otp_submit_url(), &[], &form).await?;
        let page = if has_disconnect_control(&Html::parse_document(&body)) {
            LoginPage::Authenticated
        } else {
            LoginPage::LoginFailed("the one-time code was not accepted".into())
        };
        self.state = page.state();
        Ok(page)
    }

    /// Whether the cookies we hold still open an authenticated page.
    pub async fn verify_session(&mut self) -> ConnectorResult<bool> {
        let body = self.transport.get(&urls::home_url()).await?;
        let valid = has_disconnect_control(&Html::parse_document(&body));
        if valid {
            self.state = AuthState::Authenticated;
        }
        Ok(valid)
    }

    pub async fn logout(&mut self) -> ConnectorResult<()> {
        let body = self.transport.get(&urls::logout_url()).await?;
        let landed = Html::parse_document(&body)
            .select(&selector(LOGIN_FORM_SELECTOR))
            .next()
            .is_some();
        if !landed {
            warn!("Logout did not land on the login page");
        }
        self.state = AuthState::Unauthenticated;
        Ok(())
    }

    /// Runs the whole protocol. Returns once the session is authenticated, or
    /// with the error that tells the caller what went wrong.
    pub async fn login(
        &mut self,
        credentials: &Credentials,
        otp: Option<&dyn OtpProvider>,
    ) -> ConnectorResult<()> {
        // Reject a malformed login before touching the network.
        normalize_login(&credentials.login)?;

        if self.state != AuthState::Unauthenticated && self.verify_session().await? {
            info!("Reusing the current session");
            return Ok(());
        }

        info!("Now logging in");
        self.bootstrap().await?;
        let mut page = self.submit_credentials(credentials).await?;

        if page == LoginPage::OtpRequired {
            let Some(provider) = otp else {
                return Err(ConnectorError::UserActionNeeded(UserAction::EnterOtp));
            };
            info!("A one-time code is required");
            self.state = AuthState::AwaitingUserCode;
            let code = provider.otp_code().await?;
            page = self.submit_otp(&code).await?;
        }

        if let Some(err) = page.into_error() {
            error!("Login did not succeed: {err}");
            return Err(err);
        }

        info!("Correctly logged in");
        Ok(())
    }
}
