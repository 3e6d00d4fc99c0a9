//! HTTP plumbing: the LLM proxy client, the research-log sink, and the
//! survey submission client. Everything here is a thin, blocking ureq call;
//! retry policy (where any exists) lives with the callers.

pub mod llm;
pub mod sink;
pub mod survey;

pub use llm::HttpGateway;
pub use sink::HttpLogSink;
pub use survey::{SurveyClient, SurveyKind};

use stoa_core::StoaError;

/// Map a ureq failure onto the error taxonomy: HTTP status errors carry the
/// status and body text; everything else is a transport failure.
pub(crate) fn map_http_error(err: ureq::Error) -> StoaError {
    match err {
        ureq::Error::Status(status, response) => {
            let body = response.into_string().unwrap_or_default();
            StoaError::Gateway { status, body }
        }
        ureq::Error::Transport(transport) => StoaError::Transport(transport.to_string()),
    }
}

/// One shared agent configuration; model replies can take a while.
pub(crate) fn http_agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(std::time::Duration::from_secs(120))
        .build()
}
