//! The monthly payment listing: one entry per payment line, each pointing at
//! its detail page.

use std::borrow::Cow;

use chrono::NaiveDate;
use log::warn;
use scraper::{ElementRef, Html};
use serde::Serialize;

use crate::{
    error::{ConnectorError, ConnectorResult},
    text_manipulators::{clean_text, extract_year, parse_amount, parse_french_date, parse_slash_date, selector},
    urls,
    utils::sort_by_key_ref_desc,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PaymentNature {
    ThirdPartyPayment,
    CareReimbursement,
    DailyAllowance,
    Unknown,
}

impl PaymentNature {
    pub fn from_code(code: &str) -> Self {
        match code {
            "PAIEMENT_A_UN_TIERS" => PaymentNature::ThirdPartyPayment,
            "REMBOURSEMENT_SOINS" => PaymentNature::CareReimbursement,
            "INDEMNITE_JOURNALIERE_ASSURE" => PaymentNature::DailyAllowance,
            _ => PaymentNature::Unknown,
        }
    }

    /// Short label used in file names.
    pub fn label(&self) -> &'static str {
        match self {
            PaymentNature::ThirdPartyPayment => "tiers_payant",
            PaymentNature::CareReimbursement => "remboursement",
            PaymentNature::DailyAllowance => "indemnites_journalieres",
            PaymentNature::Unknown => "paiement",
        }
    }
}

/// The arguments of a payment row's `onclick` handler.
///
/// The handler reads `chargerDetailPaiement('<id>','<nature>','<group>','<index>')`;
/// split on single quotes, the values sit at positions 1, 3, 5 and 7.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnclickTokens {
    pub id_paiement: String,
    pub nature_paiement: String,
    pub index_groupe: String,
    pub index_paiement: String,
}

impl OnclickTokens {
    pub fn decode(onclick: &str) -> ConnectorResult<Self> {
        let tokens: Vec<&str> = onclick.split('\'').collect();
        if tokens.len() < 8 {
            return Err(ConnectorError::ParseAnomaly(format!(
                "onclick handler has {} quoted segments: {onclick}",
                tokens.len()
            )));
        }
        Ok(OnclickTokens {
            id_paiement: tokens[1].to_string(),
            nature_paiement: tokens[3].to_string(),
            index_groupe: tokens[5].to_string(),
            index_paiement: tokens[7].to_string(),
        })
    }

    /// Correlation key for one line of the listing; not unique across runs.
    pub fn line_id(&self) -> String {
        format!("{}{}", self.index_groupe, self.index_paiement)
    }
}

#[derive(Debug, Clone)]
pub struct PaymentListEntry {
    pub date: NaiveDate,
    pub line_id: String,
    pub details_url: String,
    /// Site-relative PDF path, when the row carries one.
    pub link: Option<String>,
    pub group_amount: f64,
    pub payment_nature: PaymentNature,
    pub nature_code: String,
    pub is_third_party_payer: bool,
    pub id_paiement: String,
}

/// The listing comes either as a page or as an AJAX answer wrapping the same
/// markup in a JSON string.
fn listing_markup(body: &str) -> Cow<'_, str> {
    if !body.trim_start().starts_with('{') {
        return Cow::Borrowed(body);
    }
    let Ok(serde_json::Value::Object(fields)) = serde_json::from_str::<serde_json::Value>(body) else {
        return Cow::Borrowed(body);
    };
    fields
        .values()
        .filter_map(|value| value.as_str())
        .find(|markup| markup.contains("blocParMois"))
        .map(|markup| Cow::Owned(markup.to_string()))
        .unwrap_or(Cow::Borrowed(body))
}

/// End of the listing window as shown in the payments page search form.
pub fn listing_end_date(html: &str) -> Option<NaiveDate> {
    let document = Html::parse_document(html);
    let field = document.select(&selector("#paiements_1dateFin")).next()?;
    parse_slash_date(field.value().attr("value")?)
}

fn first_text(node: ElementRef, css: &str) -> Option<String> {
    node.select(&selector(css)).next().map(clean_text)
}

fn parse_row(
    row: ElementRef,
    year: &str,
    csrf_token: &str,
    timestamp: i64,
) -> ConnectorResult<PaymentListEntry> {
    let onclick = row
        .value()
        .attr("onclick")
        .ok_or_else(|| ConnectorError::ParseAnomaly("payment row without onclick handler".into()))?;
    let tokens = OnclickTokens::decode(onclick)?;

    let day = first_text(row, ".col-date .jour").unwrap_or_default();
    let month = first_text(row, ".col-date .mois").unwrap_or_default();
    let date = parse_french_date(&day, &month, year).ok_or_else(|| {
        ConnectorError::ParseAnomaly(format!("unreadable payment date: {day} {month} {year}"))
    })?;

    let group_amount = first_text(row, ".col-montant span")
        .or_else(|| first_text(row, ".col-montant"))
        .map(|text| parse_amount(&text))
        .unwrap_or(0.0);

    // Older account layouts have no inline link; the detail page has one.
    let link = row
        .select(&selector(".downdetail"))
        .next()
        .and_then(|anchor| anchor.value().attr("href"))
        .map(str::to_string);

    let payment_nature = PaymentNature::from_code(&tokens.nature_paiement);
    Ok(PaymentListEntry {
        date,
        line_id: tokens.line_id(),
        details_url: urls::details_url(
            &tokens.id_paiement,
            &tokens.nature_paiement,
            &tokens.index_groupe,
            &tokens.index_paiement,
            csrf_token,
            timestamp,
        ),
        link,
        group_amount,
        payment_nature,
        is_third_party_payer: payment_nature == PaymentNature::ThirdPartyPayment,
        nature_code: tokens.nature_paiement,
        id_paiement: tokens.id_paiement,
    })
}

/// Every payment line of the listing, newest first.
///
/// Rows that cannot be decoded are logged and skipped.
pub fn parse_listing(body: &str, csrf_token: &str, timestamp: i64) -> Vec<PaymentListEntry> {
    let markup = listing_markup(body);
    let document = Html::parse_document(&markup);
    let mut entries = Vec::new();

    // Each block is one month. Row ids are numbered after the block's position
    // in the whole page, so the index runs across blocks.
    for (block_index, block) in document.select(&selector(".blocParMois")).enumerate() {
        let Some(year) = first_text(block, ".rowdate .mois").as_deref().and_then(extract_year) else {
            warn!("Month block {block_index} has no year label");
            continue;
        };

        let row_selector = selector(&format!("[id^=\"lignePaiement{block_index}\"]"));
        for row in block.select(&row_selector) {
            match parse_row(row, &year, csrf_token, timestamp) {
                Ok(entry) => entries.push(entry),
                Err(err) => warn!("Skipping payment line in block {block_index}: {err}"),
            }
        }
    }

    sort_by_key_ref_desc(&mut entries, |entry| &entry.date);
    entries
}
