#![allow(dead_code)]

use std::sync::Mutex;

use ameli_scraper::{ConnectorResult, HttpTransport};
use async_trait::async_trait;

pub const LOGGED_IN: &str = include_str!("../fixtures/logged_in.html");
pub const LOGIN_FORM: &str = include_str!("../fixtures/login_form.html");
pub const OTP_FORM: &str = include_str!("../fixtures/otp_form.html");
pub const PAYMENTS_PAGE: &str = include_str!("../fixtures/payments_page.html");
pub const LISTING: &str = include_str!("../fixtures/listing.html");
pub const DETAIL_CARE: &str = include_str!("../fixtures/detail_care.html");
pub const DETAIL_THIRD_PARTY: &str = include_str!("../fixtures/detail_third_party.html");
pub const DETAIL_DAILY_ALLOWANCE: &str = include_str!("../fixtures/detail_daily_allowance.html");
pub const MESSAGES: &str = include_str!("../fixtures/messages.html");
pub const IDENTITY: &str = include_str!("../fixtures/identity.html");

pub const CSRF_PROBE: &str = "OWASP_CSRFTOKEN:tok123";

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub form: Vec<(String, String)>,
}

impl RecordedRequest {
    pub fn form_value(&self, name: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Serves canned pages: the first route whose pattern occurs in the URL wins.
/// Unknown URLs get an empty page, as a portal session redirect would.
#[derive(Default)]
pub struct FakePortal {
    routes: Vec<(String, String)>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl FakePortal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, pattern: &str, body: &str) -> Self {
        self.routes.push((pattern.to_string(), body.to_string()));
        self
    }

    /// A portal where the whole run succeeds.
    pub fn happy_path() -> Self {
        FakePortal::new()
            .route("_somtc=true", LOGIN_FORM)
            .route("validationconnexioncompte", LOGGED_IN)
            .route("as_accueil_page", LOGGED_IN)
            .route("as_paiements_page", PAYMENTS_PAGE)
            .route("afficherPaiementsComplementaires", LISTING)
            .route("JavaScriptServlet", CSRF_PROBE)
            .route("idPaiement=ID1&", DETAIL_CARE)
            .route("idPaiement=ID2&", DETAIL_THIRD_PARTY)
            .route("idPaiement=ID3&", DETAIL_DAILY_ALLOWANCE)
            .route("as_messages_recus_page", MESSAGES)
            .route("as_info_perso_page", IDENTITY)
            .route("deconnecter", LOGIN_FORM)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn answer(&self, request: RecordedRequest) -> String {
        let body = self
            .routes
            .iter()
            .find(|(pattern, _)| request.url.contains(pattern.as_str()))
            .map(|(_, body)| body.clone())
            .unwrap_or_else(|| "<html><body></body></html>".to_string());
        self.requests.lock().unwrap().push(request);
        body
    }
}

fn owned(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

#[async_trait]
impl HttpTransport for FakePortal {
    async fn get(&self, url: &str) -> ConnectorResult<String> {
        Ok(self.answer(RecordedRequest {
            method: "GET",
            url: url.to_string(),
            headers: Vec::new(),
            form: Vec::new(),
        }))
    }

    async fn post(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        form: &[(&str, &str)],
    ) -> ConnectorResult<String> {
        Ok(self.answer(RecordedRequest {
            method: "POST",
            url: url.to_string(),
            headers: owned(headers),
            form: owned(form),
        }))
    }
}
