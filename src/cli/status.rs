use crate::config::Config;
use crate::connection::Connection;
use crate::error::Result;
use tracing::{info, warn};

pub async fn execute() -> Result<()> {
    let config = Config::load()?;

    let mut connections: Vec<Box<dyn Connection>> = vec![
        Box::new(super::spreadsheet_connection(&config)?),
        Box::new(super::messaging_connection(&config)),
    ];

    for connection in connections.iter_mut() {
        let connected = connection.get_state().await;
        let status = connection.status();
        match connected {
            true => info!(connection = connection.name(), "● {}", status.message()),
            false => warn!(connection = connection.name(), "○ {}", status.message()),
        }
    }

    Ok(())
}
