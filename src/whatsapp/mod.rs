mod connection;
pub mod types;

pub use connection::{MessagingConnection, MessagingOverrides};
