use tracing::debug;

/// Blocking informational and error dialogs shown to the operator.
pub trait Notifier: Send + Sync {
    fn info(&self, title: &str, message: &str);

    fn error(&self, title: &str, message: &str);
}

/// Renders dialogs on the terminal for the command line front end
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn info(&self, title: &str, message: &str) {
        debug!(title, "Showing info dialog");
        println!("[{}]\n{}\n", title, message);
    }

    fn error(&self, title: &str, message: &str) {
        debug!(title, "Showing error dialog");
        eprintln!("[{}]\n{}\n", title, message);
    }
}
