pub mod api;
mod error;

pub use api::auth::{PendingAuth, Token, TokenStore};
pub use api::flow::{Credentials, Flow, OAuth};
pub use api::history::{Endpoints, HistoryClient, RideHistory, RideRecord};
pub use error::Error;
