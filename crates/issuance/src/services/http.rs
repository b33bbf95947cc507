//! Blocking HTTP plumbing shared by the outbound clients.

use std::time::Duration;

use crate::error::IssuanceError;

/// Builds an agent whose connect, read and write phases are each bounded by
/// `timeout`, and whose whole request is bounded by three times `timeout`.
pub(crate) fn build_http_agent(timeout: Duration) -> ureq::Agent {
    let timeout = timeout.max(Duration::from_millis(100));
    ureq::AgentBuilder::new()
        .timeout(timeout.saturating_mul(3))
        .timeout_connect(timeout)
        .timeout_read(timeout)
        .timeout_write(timeout)
        .user_agent(concat!("policy-issuance/", env!("CARGO_PKG_VERSION")))
        .build()
}

pub(crate) fn error_from_ureq(service: &'static str, err: ureq::Error) -> IssuanceError {
    match err {
        ureq::Error::Status(status, response) => {
            let body = response.into_string().unwrap_or_default();
            IssuanceError::external(service, format!("http {status}: {body}"))
        }
        ureq::Error::Transport(transport) => IssuanceError::external(service, transport),
    }
}
