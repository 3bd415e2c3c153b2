use crate::config::ConfigError;
use crate::http::ServerError;

/// Any error that stops the process.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Server(#[from] ServerError),
}

impl Error {
    /// Render the error followed by every cause in its `source()` chain.
    /// Causes whose text the message already contains are not repeated.
    pub fn report(&self) -> String {
        let mut report = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            let cause_text = cause.to_string();
            if !report.contains(&cause_text) {
                report.push_str(": ");
                report.push_str(&cause_text);
            }
            source = cause.source();
        }
        report
    }
}

impl From<crate::http::tls::TlsError> for Error {
    fn from(err: crate::http::tls::TlsError) -> Self {
        Error::Server(ServerError::Tls(err))
    }
}
