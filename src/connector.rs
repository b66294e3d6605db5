use chrono::{Local, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use log::{info, warn};
use serde::Serialize;

use crate::{
    auth::{Credentials, OtpProvider},
    bills::{Bill, project_bills},
    detail::{Reimbursement, parse_detail_page},
    error::{ConnectorError, ConnectorResult},
    identity::{Identity, parse_identity},
    listing::{PaymentListEntry, listing_end_date, parse_listing},
    messages::{FileRecord, attestation_file, parse_messages},
    requests::HttpTransport,
    session::Session,
    text_manipulators::format_amount,
    urls,
};

/// Detail pages fetched at once.
const DETAIL_CONCURRENCY: usize = 10;

/// How the insurer's transfers show up on bank statements.
pub const DEFAULT_BANK_IDENTIFIERS: [&str; 4] = ["c.p.a.m.", "caisse", "cpam", "ameli"];

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// How far back the listing goes; the portal keeps six months.
    pub months_back: u32,
    pub bank_identifiers: Vec<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            months_back: 6,
            bank_identifiers: DEFAULT_BANK_IDENTIFIERS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// What a run hands over to whoever persists it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutput {
    pub bills: Vec<Bill>,
    pub files: Vec<FileRecord>,
    pub identity: Option<Identity>,
    pub bank_identifiers: Vec<String>,
}

pub struct Connector<T: HttpTransport> {
    session: Session<T>,
}

impl<T: HttpTransport> Connector<T> {
    pub fn new(transport: T) -> Self {
        Connector {
            session: Session::new(transport),
        }
    }

    pub fn session(&self) -> &Session<T> {
        &self.session
    }

    /// Logs in, then collects bills, files and identity. Stops at the first
    /// login verdict that is not a success.
    pub async fn run(
        &mut self,
        credentials: &Credentials,
        otp: Option<&dyn OtpProvider>,
        options: &RunOptions,
    ) -> ConnectorResult<RunOutput> {
        self.session.login(credentials, otp).await?;

        let reimbursements = self.fetch_reimbursements(options.months_back).await?;
        let bills = project_bills(&reimbursements);
        info!("{} bills from {} payments", bills.len(), reimbursements.len());

        let mut files = self.fetch_messages().await?;
        files.push(attestation_file(Local::now().date_naive()));

        let identity = match self.fetch_identity().await {
            Ok(identity) => Some(identity),
            Err(ConnectorError::ParseAnomaly(reason)) => {
                warn!("Identity skipped: {reason}");
                None
            }
            Err(err) => return Err(err),
        };

        Ok(RunOutput {
            bills,
            files,
            identity,
            bank_identifiers: options.bank_identifiers.clone(),
        })
    }

    /// Every payment of the listing window, with its detail page read.
    pub async fn fetch_reimbursements(&mut self, months_back: u32) -> ConnectorResult<Vec<Reimbursement>> {
        info!("Fetching the list of bills");
        let payments_page = self.session.transport.get(&urls::reimbursement_url()).await?;
        let end_date = listing_end_date(&payments_page).unwrap_or_else(|| {
            warn!("No end date on the payments page, using today");
            Local::now().date_naive()
        });
        let listing = self
            .session
            .transport
            .get(&urls::bill_url(end_date, months_back))
            .await?;

        // The token in force before the listing was opened is no longer accepted.
        let token = self
            .session
            .csrf
            .refresh(&self.session.transport)
            .await?
            .to_string();
        let entries = parse_listing(&listing, &token, Utc::now().timestamp_millis());
        info!("Found {} payments", entries.len());

        let transport = &self.session.transport;
        stream::iter(entries)
            .map(|entry| fetch_reimbursement_detail(transport, entry))
            .buffered(DETAIL_CONCURRENCY)
            .try_collect()
            .await
    }

    pub async fn fetch_messages(&self) -> ConnectorResult<Vec<FileRecord>> {
        let html = self.session.transport.get(&urls::messages_url()).await?;
        let files = parse_messages(&html);
        info!("Found {} messages with attachments", files.len());
        Ok(files)
    }

    pub async fn fetch_identity(&self) -> ConnectorResult<Identity> {
        let html = self.session.transport.get(&urls::identity_url()).await?;
        parse_identity(&html)
    }

    pub async fn logout(&mut self) -> ConnectorResult<()> {
        self.session.logout().await
    }
}

async fn fetch_reimbursement_detail<T: HttpTransport>(
    transport: &T,
    entry: PaymentListEntry,
) -> ConnectorResult<Reimbursement> {
    info!("Fetching details for {} {}", entry.date, format_amount(entry.group_amount));
    let html = transport.get(&entry.details_url).await?;
    let page = parse_detail_page(&html, entry.payment_nature);
    let mut reimbursement = Reimbursement::new(entry);
    reimbursement.enrich(page);
    Ok(reimbursement)
}
