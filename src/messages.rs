//! Vendor correspondence and other documents that are saved as plain files,
//! with no bill attached.

use chrono::NaiveDate;
use log::debug;
use scraper::Html;
use serde::Serialize;

use crate::{
    text_manipulators::{clean_text, parse_slash_date, selector},
    urls,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub file_url: String,
    pub filename: String,
    pub vendor_ref: String,
    pub date: Option<NaiveDate>,
    pub subject: Option<String>,
}

/// Every received message that has a PDF attached.
pub fn parse_messages(html: &str) -> Vec<FileRecord> {
    let document = Html::parse_document(html);
    let mut files = Vec::new();

    for row in document.select(&selector(".ligneMessage")) {
        let Some(href) = row
            .select(&selector("a.lienPieceJointe"))
            .next()
            .and_then(|anchor| anchor.value().attr("href"))
        else {
            debug!("Message without attachment skipped");
            continue;
        };
        let vendor_ref = row
            .value()
            .attr("data-idmessage")
            .map(str::to_string)
            .unwrap_or_else(|| href.rsplit(['=', '/']).next().unwrap_or(href).to_string());
        let date = row
            .select(&selector(".dateMessage"))
            .next()
            .and_then(|cell| parse_slash_date(&clean_text(cell)));
        let subject = row
            .select(&selector(".objetMessage"))
            .next()
            .map(clean_text)
            .filter(|subject| !subject.is_empty());

        let prefix = date.map(|date| date.format("%Y%m%d").to_string()).unwrap_or_default();
        files.push(FileRecord {
            file_url: urls::absolute(href),
            filename: format!("{prefix}_ameli_message_{vendor_ref}.pdf"),
            vendor_ref,
            date,
            subject,
        });
    }
    files
}

/// The certificate of entitlement, regenerated by the portal on every download.
pub fn attestation_file(today: NaiveDate) -> FileRecord {
    FileRecord {
        file_url: urls::attestation_url(),
        filename: format!("{}_ameli_attestation_droits.pdf", today.format("%Y%m%d")),
        vendor_ref: "attestation_droits".into(),
        date: Some(today),
        subject: Some("Attestation de droits".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_with_attachments_become_files() {
        let html = r#"
            <table>
              <tr class="ligneMessage" data-idmessage="M42">
                <td class="dateMessage">02/05/2024</td>
                <td class="objetMessage"> Votre relevé   mensuel </td>
                <td><a class="lienPieceJointe" href="/PortailAS/messagerie.do?idPJ=PJ1">PDF</a></td>
              </tr>
              <tr class="ligneMessage" data-idmessage="M43">
                <td class="dateMessage">03/05/2024</td>
                <td class="objetMessage">Sans pièce jointe</td>
              </tr>
              <tr class="ligneMessage">
                <td class="dateMessage">bientôt</td>
                <td><a class="lienPieceJointe" href="/PortailAS/messagerie.do?idPJ=PJ9">PDF</a></td>
              </tr>
            </table>"#;
        let files = parse_messages(html);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].vendor_ref, "M42");
        assert_eq!(files[0].filename, "20240502_ameli_message_M42.pdf");
        assert_eq!(files[0].subject.as_deref(), Some("Votre relevé mensuel"));
        assert_eq!(files[0].file_url, "https://assure.ameli.fr/PortailAS/messagerie.do?idPJ=PJ1");
        assert_eq!(files[1].vendor_ref, "PJ9");
        assert_eq!(files[1].date, None);
        assert_eq!(files[1].filename, "_ameli_message_PJ9.pdf");
    }

    #[test]
    fn attestation_is_named_after_the_day() {
        let file = attestation_file(NaiveDate::from_ymd_opt(2024, 5, 2).unwrap());
        assert_eq!(file.filename, "20240502_ameli_attestation_droits.pdf");
        assert!(file.file_url.ends_with("PDFServletAttestationDroits.dopdf"));
    }
}
