//! Detail pages: what each payment of the listing actually covers.
//!
//! Care payments are laid out as a flat run of `.container` blocks. A block
//! naming a beneficiary is followed by the block holding that beneficiary's
//! care lines; a table block with no beneficiary before it is the flat
//! co-payment ("participation forfaitaire") of the whole payment. The pairing
//! is purely positional, so blocks must be read in document order.

use std::{collections::BTreeMap, sync::LazyLock};

use chrono::NaiveDate;
use log::{debug, error, warn};
use regex::Regex;
use scraper::{ElementRef, Html};

use crate::{
    listing::{PaymentListEntry, PaymentNature},
    text_manipulators::{clean_text, parse_slash_date, selector, try_parse_amount},
};

static DAILY_ALLOWANCE_SENTENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Paiement effectué le (\d{2}/\d{2}/\d{4}) pour un montant de ([\d\s,.]+?)\s*€")
        .unwrap_or_else(|e| panic!("invalid daily allowance pattern: {e}"))
});

#[derive(Debug, Clone, PartialEq)]
pub struct HealthCareLine {
    /// 1-based position in the beneficiary's list, in page order.
    pub index: usize,
    pub care_type: String,
    pub date: Option<NaiveDate>,
    pub amount_billed: Option<f64>,
    pub reimbursement_base: Option<f64>,
    pub rate: String,
    pub amount_reimbursed: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParticipationLine {
    pub care_type: String,
    pub date: Option<NaiveDate>,
    pub amount_reimbursed: Option<f64>,
}

/// Everything read off one detail page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailPage {
    pub link: Option<String>,
    pub beneficiaries: BTreeMap<String, Vec<HealthCareLine>>,
    pub participation: Option<ParticipationLine>,
    pub amount: Option<f64>,
    pub date: Option<NaiveDate>,
}

/// A listing entry plus what its detail page says.
#[derive(Debug, Clone)]
pub struct Reimbursement {
    pub entry: PaymentListEntry,
    pub link: Option<String>,
    pub beneficiaries: BTreeMap<String, Vec<HealthCareLine>>,
    pub participation: Option<ParticipationLine>,
    /// Only daily allowances carry their own amount and date.
    pub amount: Option<f64>,
    pub date: Option<NaiveDate>,
}

impl Reimbursement {
    pub fn new(entry: PaymentListEntry) -> Self {
        Reimbursement {
            link: entry.link.clone(),
            entry,
            beneficiaries: BTreeMap::new(),
            participation: None,
            amount: None,
            date: None,
        }
    }

    pub fn enrich(&mut self, page: DetailPage) {
        // Not every account has the link on the listing row.
        if self.link.is_none() {
            self.link = page.link;
        }
        if self.link.is_none() {
            error!("Download link not found for payment {}", self.entry.line_id);
        }
        self.beneficiaries = page.beneficiaries;
        self.participation = page.participation;
        self.amount = page.amount;
        self.date = page.date;
    }
}

enum Container<'a> {
    Beneficiary(String),
    Table(ElementRef<'a>),
}

fn classify_container(container: ElementRef<'_>) -> Container<'_> {
    match container.select(&selector("[id^=nomBeneficiaire]")).next() {
        Some(name) => Container::Beneficiary(clean_text(name)),
        None => Container::Table(container),
    }
}

#[derive(Default)]
enum Pending {
    #[default]
    Nobody,
    Beneficiary(String),
}

#[derive(Default)]
struct Walk {
    pending: Pending,
    beneficiaries: BTreeMap<String, Vec<HealthCareLine>>,
    participation: Option<ParticipationLine>,
}

impl Walk {
    fn step(mut self, container: Container<'_>) -> Self {
        match (container, std::mem::take(&mut self.pending)) {
            // A blank name leaves the next table unattributed.
            (Container::Beneficiary(name), _) if name.is_empty() => {
                debug!("Beneficiary block without a name");
            }
            (Container::Beneficiary(name), _) => self.pending = Pending::Beneficiary(name),
            (Container::Table(table), Pending::Beneficiary(name)) => {
                let lines = self.beneficiaries.entry(name).or_default();
                for row in body_rows(table) {
                    let line = parse_health_care_line(row, lines.len() + 1);
                    lines.push(line);
                }
            }
            (Container::Table(table), Pending::Nobody) => {
                for row in body_rows(table) {
                    if self.participation.is_some() {
                        warn!("There is already a participation on this payment, keeping the last one");
                    }
                    self.participation = Some(parse_participation_line(row));
                }
            }
        }
        self
    }
}

fn body_rows(container: ElementRef<'_>) -> impl Iterator<Item = ElementRef<'_>> {
    container
        .select(&selector("tr"))
        .filter(|row| row.select(&selector("th")).next().is_none())
        .collect::<Vec<_>>()
        .into_iter()
}

fn cell_text(row: ElementRef, css: &str) -> String {
    row.select(&selector(css)).next().map(clean_text).unwrap_or_default()
}

/// The care cell reads `<label><br>DD/MM/YYYY`.
fn care_date(row: ElementRef) -> Option<NaiveDate> {
    let cell = row.select(&selector("[id^=Nature]")).next()?;
    let html = cell.inner_html();
    let (_, after_break) = html.split_once("<br>")?;
    let fragment = Html::parse_fragment(after_break);
    let text = fragment.root_element().text().collect::<String>();
    parse_slash_date(&text)
}

fn parse_health_care_line(row: ElementRef, index: usize) -> HealthCareLine {
    HealthCareLine {
        index,
        care_type: cell_text(row, ".naturePrestation"),
        date: care_date(row),
        amount_billed: try_parse_amount(&cell_text(row, "[id^=montantPaye]")),
        reimbursement_base: try_parse_amount(&cell_text(row, "[id^=baseRemboursement]")),
        rate: cell_text(row, "[id^=taux]"),
        amount_reimbursed: try_parse_amount(&cell_text(row, "[id^=montantVerse]")),
    }
}

fn parse_participation_line(row: ElementRef) -> ParticipationLine {
    ParticipationLine {
        care_type: cell_text(row, "[id^=naturePFF]"),
        date: parse_slash_date(&cell_text(row, "[id^=dateActePFF]")),
        amount_reimbursed: try_parse_amount(&cell_text(row, "[id^=montantVerse]")),
    }
}

fn parse_care_containers(document: &Html) -> DetailPage {
    let walk = document
        .select(&selector(".container:not(.entete)"))
        .map(classify_container)
        .fold(Walk::default(), Walk::step);
    if let Pending::Beneficiary(name) = walk.pending {
        warn!("Beneficiary {name} has no care lines on this page");
    }
    DetailPage {
        beneficiaries: walk.beneficiaries,
        participation: walk.participation,
        ..DetailPage::default()
    }
}

fn parse_daily_allowance(document: &Html) -> DetailPage {
    let found = document
        .select(&selector("h1, h2, h3, h4"))
        .map(clean_text)
        .find_map(|heading| {
            let caps = DAILY_ALLOWANCE_SENTENCE.captures(&heading)?;
            let date = parse_slash_date(caps.get(1)?.as_str())?;
            let amount = try_parse_amount(caps.get(2)?.as_str())?;
            Some((date, amount))
        });
    match found {
        Some((date, amount)) => DetailPage {
            amount: Some(amount),
            date: Some(date),
            ..DetailPage::default()
        },
        None => {
            warn!("No payment sentence found on a daily allowance page");
            DetailPage::default()
        }
    }
}

/// Reads a detail page according to the nature of the payment it belongs to.
pub fn parse_detail_page(html: &str, nature: PaymentNature) -> DetailPage {
    let document = Html::parse_document(html);
    let mut page = match nature {
        PaymentNature::ThirdPartyPayment | PaymentNature::CareReimbursement => {
            parse_care_containers(&document)
        }
        PaymentNature::DailyAllowance => parse_daily_allowance(&document),
        PaymentNature::Unknown => DetailPage::default(),
    };
    page.link = document
        .select(&selector(".entete [id^=liendowndecompte]"))
        .next()
        .and_then(|anchor| anchor.value().attr("href"))
        .map(str::to_string);
    page
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beneficiary(name: &str) -> String {
        format!(r#"<div class="container"><span id="nomBeneficiaire0">  {name} </span></div>"#)
    }

    fn care_row(care: &str, date: &str, billed: &str, reimbursed: &str) -> String {
        format!(
            r#"<tr>
                 <td id="Nature0"><span class="naturePrestation">{care}</span><br>{date}</td>
                 <td id="montantPaye0">{billed}</td>
                 <td id="baseRemboursement0">{billed}</td>
                 <td id="taux0">70 %</td>
                 <td id="montantVerse0">{reimbursed}</td>
               </tr>"#
        )
    }

    fn care_table(rows: &[String]) -> String {
        format!(
            r#"<div class="container"><table><tr><th>Nature</th><th>Montant</th></tr>{}</table></div>"#,
            rows.join("")
        )
    }

    fn participation_table(care: &str, date: &str, amount: &str) -> String {
        format!(
            r#"<div class="container"><table>
                 <tr><th>Participation</th></tr>
                 <tr><td id="naturePFF0">{care}</td><td id="dateActePFF0">{date}</td><td id="montantVerse9">{amount}</td></tr>
               </table></div>"#
        )
    }

    fn page(header_link: Option<&str>, containers: &[String]) -> String {
        let link = header_link
            .map(|href| format!(r#"<a id="liendowndecompte0" href="{href}">PDF</a>"#))
            .unwrap_or_default();
        format!(
            r#"<html><body><div class="container entete">{link}</div>{}</body></html>"#,
            containers.join("")
        )
    }

    #[test]
    fn one_beneficiary_with_two_lines() {
        let html = page(
            Some("/PortailAS/PDFServletDetailPaiementPT.dopdf?idPaiement=x"),
            &[
                beneficiary("Alice"),
                care_table(&[
                    care_row("C GENERALISTE", "17/08/2017", "25,00 €", "17,50 €"),
                    care_row("PHARMACIE", "18/08/2017", "10,00 €", "6,50 €"),
                ]),
            ],
        );
        let detail = parse_detail_page(&html, PaymentNature::CareReimbursement);
        assert_eq!(detail.beneficiaries.len(), 1);
        let lines = &detail.beneficiaries["Alice"];
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].index, 1);
        assert_eq!(lines[1].index, 2);
        assert_eq!(lines[0].care_type, "C GENERALISTE");
        assert_eq!(lines[0].date, NaiveDate::from_ymd_opt(2017, 8, 17));
        assert_eq!(lines[0].amount_billed, Some(25.0));
        assert_eq!(lines[0].amount_reimbursed, Some(17.5));
        assert_eq!(lines[0].rate, "70 %");
        assert!(detail.participation.is_none());
        assert_eq!(
            detail.link.as_deref(),
            Some("/PortailAS/PDFServletDetailPaiementPT.dopdf?idPaiement=x")
        );
    }

    #[test]
    fn each_beneficiary_takes_the_table_right_after_it() {
        let html = page(
            None,
            &[
                beneficiary("Alice"),
                care_table(&[care_row("A", "01/01/2024", "1,00 €", "1,00 €")]),
                beneficiary("Bob"),
                care_table(&[
                    care_row("B1", "02/01/2024", "2,00 €", "2,00 €"),
                    care_row("B2", "03/01/2024", "3,00 €", "3,00 €"),
                    care_row("B3", "04/01/2024", "4,00 €", "4,00 €"),
                ]),
                participation_table("PARTICIPATION FORFAITAIRE", "05/01/2024", "-1,00 €"),
            ],
        );
        let detail = parse_detail_page(&html, PaymentNature::ThirdPartyPayment);
        assert_eq!(detail.beneficiaries["Alice"].len(), 1);
        assert_eq!(detail.beneficiaries["Bob"].len(), 3);
        let participation = detail.participation.unwrap();
        assert_eq!(participation.care_type, "PARTICIPATION FORFAITAIRE");
        assert_eq!(participation.date, NaiveDate::from_ymd_opt(2024, 1, 5));
        assert_eq!(participation.amount_reimbursed, Some(-1.0));
        assert_eq!(detail.link, None);
    }

    #[test]
    fn blank_beneficiary_name_is_not_a_beneficiary() {
        let html = page(
            None,
            &[
                beneficiary(""),
                participation_table("PARTICIPATION FORFAITAIRE", "17/08/2017", "-1,00 €"),
            ],
        );
        let detail = parse_detail_page(&html, PaymentNature::CareReimbursement);
        assert!(detail.beneficiaries.is_empty());
        let participation = detail.participation.unwrap();
        assert_eq!(participation.care_type, "PARTICIPATION FORFAITAIRE");
        assert_eq!(participation.amount_reimbursed, Some(-1.0));
    }

    #[test]
    fn plain_table_alone_is_a_participation() {
        let html = page(None, &[participation_table("PF", "05/01/2024", "1,00 €")]);
        let detail = parse_detail_page(&html, PaymentNature::CareReimbursement);
        assert!(detail.beneficiaries.is_empty());
        assert!(detail.participation.is_some());
    }

    #[test]
    fn second_participation_overwrites_the_first() {
        let html = page(
            None,
            &[
                participation_table("FIRST", "05/01/2024", "1,00 €"),
                participation_table("SECOND", "06/01/2024", "2,00 €"),
            ],
        );
        let detail = parse_detail_page(&html, PaymentNature::CareReimbursement);
        assert_eq!(detail.participation.unwrap().care_type, "SECOND");
    }

    #[test]
    fn garbage_amount_is_kept_as_unparsed() {
        let html = page(
            None,
            &[beneficiary("Alice"), care_table(&[care_row("A", "01/01/2024", "", "abc")])],
        );
        let detail = parse_detail_page(&html, PaymentNature::CareReimbursement);
        let line = &detail.beneficiaries["Alice"][0];
        assert_eq!(line.amount_billed, Some(0.0));
        assert_eq!(line.amount_reimbursed, None);
    }

    #[test]
    fn daily_allowance_sentence() {
        let html = r#"<div class="container entete"><h3>Paiement effectué le 12/03/2024 pour un montant de 1 234,56 €</h3></div>"#;
        let detail = parse_detail_page(html, PaymentNature::DailyAllowance);
        assert_eq!(detail.amount, Some(1234.56));
        assert_eq!(detail.date, NaiveDate::from_ymd_opt(2024, 3, 12));
        assert!(detail.beneficiaries.is_empty());
    }

    #[test]
    fn daily_allowance_without_sentence_stays_empty() {
        let detail = parse_detail_page("<h3>Autre chose</h3>", PaymentNature::DailyAllowance);
        assert_eq!(detail.amount, None);
        assert_eq!(detail.date, None);
    }

    #[test]
    fn unknown_nature_is_left_alone() {
        let html = page(None, &[beneficiary("Alice"), care_table(&[care_row("A", "01/01/2024", "1", "1")])]);
        let detail = parse_detail_page(&html, PaymentNature::Unknown);
        assert!(detail.beneficiaries.is_empty());
        assert!(detail.participation.is_none());
    }
}
