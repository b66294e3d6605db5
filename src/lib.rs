pub mod auth;
pub mod bills;
pub mod config;
pub mod connector;
pub mod csrf;
pub mod detail;
pub mod error;
pub mod identity;
pub mod listing;
pub mod messages;
mod ratelimit;
pub mod requests;
pub mod session;
mod text_manipulators;
pub mod urls;
mod utils;

pub use auth::{AuthState, Credentials, LoginPage, OtpProvider};
pub use bills::{Bill, project_bills};
pub use connector::{Connector, RunOptions, RunOutput};
pub use error::{ConnectorError, ConnectorResult, UserAction};
pub use requests::{HttpTransport, RequestClient};
pub use session::Session;
pub use text_manipulators::{format_amount, parse_amount};
