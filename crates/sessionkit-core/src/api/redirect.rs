use tracing::warn;

/// Path of the login entry point
pub const DEFAULT_LOGIN_PATH: &str = "/user";

/// Invoked when the session cannot be recovered and the user must log in again.
pub trait LoginRedirect: Send + Sync {
    fn redirect_to_login(&self, login_path: &str);
}

/// Redirect that only records the event in the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogRedirect;

impl LoginRedirect for LogRedirect {
    fn redirect_to_login(&self, login_path: &str) {
        warn!(login_path, "Session expired, login required");
    }
}

impl<F> LoginRedirect for F
where
    F: Fn(&str) + Send + Sync,
{
    fn redirect_to_login(&self, login_path: &str) {
        self(login_path)
    }
}
