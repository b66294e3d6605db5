//! Every portal endpoint the connector talks to.

use chrono::{Months, NaiveDate};

pub const DOMAIN: &str = "https://assure.ameli.fr";

const PORTAL: &str = "https://assure.ameli.fr/PortailAS/appmanager/PortailAS/assure";
const PAYMENTS_ACTION: &str = "https://assure.ameli.fr/PortailAS/paiements.do?actionEvt=";

pub fn login_url() -> String {
    format!("{PORTAL}?_somtc=true")
}

pub fn submit_url() -> String {
    format!(
        "{PORTAL}?_nfpb=true&_windowLabel=connexioncompte_2&connexioncompte_2_actionOverride=\
/portlets/connexioncompte/validationconnexioncompte&_pageLabel=as_login_page"
    )
}

pub fn otp_submit_url() -> String {
    format!(
        "{PORTAL}?_nfpb=true&_windowLabel=connexioncompte_2&connexioncompte_2_actionOverride=\
/portlets/connexioncompte/validationcodeotp&_pageLabel=as_login_page"
    )
}

pub fn logout_url() -> String {
    format!("{PORTAL}?_nfpb=true&_pageLabel=as_login_page&connexioncompte_2actionEvt=deconnecter")
}

/// A page that only renders for a live session, used to probe it.
pub fn home_url() -> String {
    format!("{PORTAL}?_nfpb=true&_pageLabel=as_accueil_page")
}

pub fn reimbursement_url() -> String {
    format!("{PORTAL}?_nfpb=true&_pageLabel=as_paiements_page")
}

pub fn identity_url() -> String {
    format!("{PORTAL}?_nfpb=true&_pageLabel=as_info_perso_page")
}

pub fn messages_url() -> String {
    format!("{PORTAL}?_nfpb=true&_pageLabel=as_messages_recus_page")
}

pub fn attestation_url() -> String {
    format!("{DOMAIN}/PortailAS/PDFServletAttestationDroits.dopdf")
}

/// The CSRF guard servlet; a POST here answers `<name>:<token>`.
pub fn csrf_probe_url() -> String {
    format!("{DOMAIN}/PortailAS/JavaScriptServlet")
}

/// Listing of every payment between `end_date - months_back` and `end_date`.
pub fn bill_url(end_date: NaiveDate, months_back: u32) -> String {
    let start_date = end_date
        .checked_sub_months(Months::new(months_back))
        .unwrap_or(end_date);
    format!(
        "{PAYMENTS_ACTION}afficherPaiementsComplementaires&DateDebut={}&DateFin={}\
&Beneficiaire=tout_selectionner&afficherReleves=false&afficherIJ=false&afficherInva=false\
&afficherRentes=false&afficherRS=false&indexPaiement=&idNotif=",
        start_date.format("%d/%m/%Y"),
        end_date.format("%d/%m/%Y"),
    )
}

pub fn details_url(
    id_paiement: &str,
    nature_paiement: &str,
    index_groupe: &str,
    index_paiement: &str,
    csrf_token: &str,
    timestamp: i64,
) -> String {
    format!(
        "{PAYMENTS_ACTION}chargerDetailPaiements&idPaiement={id_paiement}\
&naturePaiement={nature_paiement}&indexGroupe={index_groupe}&indexPaiement={index_paiement}\
&OWASP_CSRFTOKEN={csrf_token}&_={timestamp}"
    )
}

/// Portal links are site-relative.
pub fn absolute(path: &str) -> String {
    if path.starts_with("http") {
        path.to_string()
    } else {
        format!("{DOMAIN}{path}")
    }
}
