use std::collections::BTreeMap;

use chrono::NaiveDate;
use log::warn;
use serde::Serialize;

use crate::{
    detail::Reimbursement,
    listing::PaymentNature,
    urls,
};

const VENDOR: &str = "Ameli";
const BILL_VERSION: u32 = 1;
const DAILY_ALLOWANCE_SUBTYPE: &str = "INDEMNITES JOURNALIERES";

/// What the file store needs to download the PDF behind `file_url`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestOptions {
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillMetadata {
    pub version: u32,
    pub group_amount: f64,
    pub line_id: String,
    pub id_paiement: String,
    pub nature: String,
    /// Position of the care line in its beneficiary's list.
    pub line_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bill {
    #[serde(rename = "type")]
    pub bill_type: String,
    pub subtype: String,
    pub beneficiary: Option<String>,
    pub is_third_party_payer: bool,
    pub date: NaiveDate,
    pub original_date: Option<NaiveDate>,
    pub vendor: String,
    pub is_refund: bool,
    pub amount: f64,
    pub original_amount: Option<f64>,
    pub file_url: Option<String>,
    pub request_options: RequestOptions,
    pub vendor_ref: String,
    pub filename: String,
    pub metadata: BillMetadata,
}

/// Same payment, same name: the file store uses it to skip files it already has.
pub fn file_name(reimbursement: &Reimbursement) -> String {
    let date = reimbursement.date.unwrap_or(reimbursement.entry.date);
    let amount = reimbursement.amount.unwrap_or(reimbursement.entry.group_amount);
    format!(
        "{}_ameli_{}_{:.2}EUR.pdf",
        date.format("%Y%m%d"),
        reimbursement.entry.payment_nature.label(),
        amount
    )
}

struct BillLine<'a> {
    /// Identifies the line within its payment; appended to the payment id.
    key: String,
    subtype: &'a str,
    beneficiary: Option<&'a str>,
    original_date: Option<NaiveDate>,
    amount: Option<f64>,
    original_amount: Option<f64>,
    line_index: Option<usize>,
}

fn build_bill(reimbursement: &Reimbursement, line: BillLine<'_>) -> Option<Bill> {
    let entry = &reimbursement.entry;
    let Some(amount) = line.amount.filter(|amount| amount.is_finite()) else {
        warn!(
            "Dropping {} line of payment {}: amount could not be read",
            line.subtype, entry.line_id
        );
        return None;
    };
    let headers = BTreeMap::from([("Referer".to_string(), urls::reimbursement_url())]);
    Some(Bill {
        bill_type: "health".into(),
        subtype: line.subtype.to_string(),
        beneficiary: line.beneficiary.map(str::to_string),
        is_third_party_payer: entry.is_third_party_payer,
        date: reimbursement.date.unwrap_or(entry.date),
        original_date: line.original_date,
        vendor: VENDOR.into(),
        is_refund: true,
        amount,
        original_amount: line.original_amount,
        file_url: reimbursement.link.as_deref().map(urls::absolute),
        request_options: RequestOptions { headers },
        vendor_ref: format!("{}_{}", entry.id_paiement, line.key),
        filename: file_name(reimbursement),
        metadata: BillMetadata {
            version: BILL_VERSION,
            group_amount: entry.group_amount,
            line_id: entry.line_id.clone(),
            id_paiement: entry.id_paiement.clone(),
            nature: entry.nature_code.clone(),
            line_index: line.line_index,
        },
    })
}

fn bills_for(reimbursement: &Reimbursement) -> Vec<Bill> {
    let mut lines = Vec::new();
    for (beneficiary, care_lines) in &reimbursement.beneficiaries {
        for care in care_lines {
            lines.push(BillLine {
                key: format!("{beneficiary}_{}", care.index),
                subtype: &care.care_type,
                beneficiary: Some(beneficiary.as_str()),
                original_date: care.date,
                amount: care.amount_reimbursed,
                original_amount: care.amount_billed,
                line_index: Some(care.index),
            });
        }
    }
    if let Some(participation) = &reimbursement.participation {
        lines.push(BillLine {
            key: "participation".into(),
            subtype: &participation.care_type,
            beneficiary: None,
            original_date: participation.date,
            amount: participation.amount_reimbursed,
            original_amount: None,
            line_index: None,
        });
    }
    if reimbursement.entry.payment_nature == PaymentNature::DailyAllowance {
        lines.push(BillLine {
            key: "ij".into(),
            subtype: DAILY_ALLOWANCE_SUBTYPE,
            beneficiary: None,
            original_date: None,
            amount: reimbursement.amount,
            original_amount: None,
            line_index: None,
        });
    }

    lines
        .into_iter()
        .filter_map(|line| build_bill(reimbursement, line))
        .collect()
}

/// Flattens reimbursements into one bill per care line, participation or
/// allowance. Lines whose amount could not be read are left out.
pub fn project_bills(reimbursements: &[Reimbursement]) -> Vec<Bill> {
    reimbursements.iter().flat_map(bills_for).collect()
}
