use tokio::sync::mpsc;

pub const LOGIN_PATH: &str = "/auth/login";

/// Forced navigation, used only when a session cannot be refreshed.
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

pub fn redirect_to_login(navigator: &dyn Navigator) {
    tracing::info!("Redirecting to {LOGIN_PATH}");
    navigator.navigate(LOGIN_PATH);
}

/// Navigator for headless use: records the redirect in the log only.
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn navigate(&self, path: &str) {
        tracing::warn!("Navigation to {path} requested with no view attached");
    }
}

/// Forwards navigation requests to whatever drives the views.
pub struct ChannelNavigator {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelNavigator {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Navigator for ChannelNavigator {
    fn navigate(&self, path: &str) {
        if self.tx.send(path.to_string()).is_err() {
            tracing::debug!("Navigation to {path} dropped, no receiver");
        }
    }
}
