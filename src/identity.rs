use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use scraper::Html;
use serde::Serialize;

use crate::{
    error::{ConnectorError, ConnectorResult},
    text_manipulators::{clean_text, parse_slash_date, selector},
};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Name {
    pub given_name: String,
    pub family_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub street: String,
    pub postcode: Option<String>,
    pub city: Option<String>,
    pub formatted_address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub name: Name,
    pub birthday: Option<NaiveDate>,
    pub social_security_number: String,
    pub address: Option<Address>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

static POSTCODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{5}\b").unwrap_or_else(|e| panic!("invalid postcode pattern: {e}"))
});

/// Splits `"12 rue des Lilas 75011 PARIS"` around its five-digit postcode.
pub fn split_address(formatted: &str) -> Address {
    match POSTCODE.find(formatted) {
        Some(found) => Address {
            street: formatted[..found.start()].trim().trim_end_matches(',').to_string(),
            postcode: Some(found.as_str().to_string()),
            city: Some(formatted[found.end()..].trim().to_string()).filter(|city| !city.is_empty()),
            formatted_address: formatted.to_string(),
        },
        None => Address {
            street: formatted.to_string(),
            postcode: None,
            city: None,
            formatted_address: formatted.to_string(),
        },
    }
}

fn non_empty(value: String) -> Option<String> {
    Some(value).filter(|value| !value.is_empty())
}

/// Reads the account holder's details off the personal information page.
pub fn parse_identity(html: &str) -> ConnectorResult<Identity> {
    let document = Html::parse_document(html);
    let label_selector = selector(".libelle");
    let data_selector = selector(".valeur");
    let mut identity = Identity::default();

    for row in document.select(&selector("#infosPersonnelles .ligneInfo")) {
        let labels: Vec<_> = row.select(&label_selector).map(clean_text).collect();
        let data: Vec<_> = row.select(&data_selector).map(clean_text).collect();

        for (label, data) in labels.iter().zip(data.into_iter()) {
            match label.trim_end_matches(':').trim().to_lowercase().as_str() {
                "nom" => identity.name.family_name = data,
                "prénom" => identity.name.given_name = data,
                "date de naissance" => identity.birthday = parse_slash_date(&data),
                "numéro de sécurité sociale" => {
                    identity.social_security_number = data.split_whitespace().collect()
                }
                "adresse postale" => identity.address = non_empty(data).map(|data| split_address(&data)),
                "téléphone" | "téléphone portable" | "téléphone fixe" => {
                    if identity.phone.is_none() {
                        identity.phone = non_empty(data);
                    }
                }
                "adresse e-mail" | "email" => identity.email = non_empty(data),
                _ => {}
            }
        }
    }

    if identity.name.family_name.is_empty() || identity.social_security_number.is_empty() {
        return Err(ConnectorError::ParseAnomaly(
            "no personal information found on the account page".into(),
        ));
    }
    Ok(identity)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(label: &str, value: &str) -> String {
        format!(r#"<div class="ligneInfo"><span class="libelle">{label}</span><span class="valeur">{value}</span></div>"#)
    }

    #[test]
    fn reads_every_labelled_field() {
        let html = format!(
            r#"<div id="infosPersonnelles">{}{}{}{}{}{}{}{}</div>"#,
            line("Nom :", "DUPONT"),
            line("Prénom :", "Marie"),
            line("Date de naissance :", "04/07/1985"),
            line("Numéro de sécurité sociale :", "2 85 07 75 111 222"),
            line("Adresse postale :", "12 rue des Lilas 75011 PARIS"),
            line("Téléphone portable :", "06 12 34 56 78"),
            line("Téléphone fixe :", "01 23 45 67 89"),
            line("Adresse e-mail :", "marie@example.org"),
        );
        let identity = parse_identity(&html).unwrap();
        assert_eq!(identity.name.family_name, "DUPONT");
        assert_eq!(identity.name.given_name, "Marie");
        assert_eq!(identity.birthday, NaiveDate::from_ymd_opt(1985, 7, 4));
        assert_eq!(identity.social_security_number, "2850775111222");
        assert_eq!(identity.phone.as_deref(), Some("06 12 34 56 78"));
        assert_eq!(identity.email.as_deref(), Some("marie@example.org"));
        let address = identity.address.unwrap();
        assert_eq!(address.street, "12 rue des Lilas");
        assert_eq!(address.postcode.as_deref(), Some("75011"));
        assert_eq!(address.city.as_deref(), Some("PARIS"));
    }

    #[test]
    fn address_without_postcode_stays_whole() {
        let address = split_address("Lieu-dit Les Granges");
        assert_eq!(address.street, "Lieu-dit Les Granges");
        assert_eq!(address.postcode, None);
        assert_eq!(address.city, None);
    }

    #[test]
    fn optional_fields_may_be_missing() {
        let html = format!(
            r#"<div id="infosPersonnelles">{}{}</div>"#,
            line("Nom", "DUPONT"),
            line("Numéro de sécurité sociale", "2850775111222"),
        );
        let identity = parse_identity(&html).unwrap();
        assert_eq!(identity.address, None);
        assert_eq!(identity.phone, None);
        assert_eq!(identity.birthday, None);
    }

    #[test]
    fn page_without_details_is_an_anomaly() {
        assert!(matches!(parse_identity("<p>Session expirée</p>"), Err(ConnectorError::ParseAnomaly(_))));
    }

    #[test]
    fn name_or_number_alone_is_an_anomaly() {
        let name_only = format!(r#"<div id="infosPersonnelles">{}</div>"#, line("Nom :", "DUPONT"));
        assert!(matches!(parse_identity(&name_only), Err(ConnectorError::ParseAnomaly(_))));

        let number_only = format!(
            r#"<div id="infosPersonnelles">{}</div>"#,
            line("Numéro de sécurité sociale :", "2 85 07 75 111 222")
        );
        assert!(matches!(parse_identity(&number_only), Err(ConnectorError::ParseAnomaly(_))));
    }
}
