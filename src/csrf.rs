use log::debug;

use crate::{
    error::{ConnectorError, ConnectorResult},
    requests::HttpTransport,
    urls,
};

/// The anti-forgery token the portal expects on detail requests.
///
/// One current value, replaced wholesale on every refresh. The server binds it
/// to the session for the lifetime of the listing view, so concurrent detail
/// fetches may share the same snapshot.
#[derive(Debug, Default, Clone)]
pub struct CsrfToken {
    value: Option<String>,
}

impl CsrfToken {
    pub fn get(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Probes the guard servlet and keeps the token it hands out.
    pub async fn refresh<T: HttpTransport + ?Sized>(&mut self, transport: &T) -> ConnectorResult<&str> {
        let body = transport
            .post(&urls::csrf_probe_url(), &[("FETCH-CSRF-TOKEN", "1")], &[])
            .await?;
        let token = parse_probe_body(&body)?;
        debug!("Refreshed the CSRF token");
        Ok(self.value.insert(token).as_str())
    }
}

/// The probe answers `<name>:<token>`; the token is whatever follows the last colon.
pub fn parse_probe_body(body: &str) -> ConnectorResult<String> {
    let token = body
        .rsplit_once(':')
        .map(|(_, token)| token.trim())
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ConnectorError::ParseAnomaly("no CSRF token in probe response".into()))?;
    Ok(token.to_string())
}
