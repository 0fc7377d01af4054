mod auth;
mod connection;
mod credentials;

pub use connection::{SheetsOverrides, SpreadsheetConnection};
