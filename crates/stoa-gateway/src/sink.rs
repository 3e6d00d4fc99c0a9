//! Research-log sink: POSTs export payloads to the log endpoint.

use serde_json::{json, Value};
use tracing::warn;

use stoa_core::{LogSink, SessionMeta, StoaResult};

use crate::{http_agent, map_http_error};

pub struct HttpLogSink {
    agent: ureq::Agent,
    endpoint: String,
}

impl HttpLogSink {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            agent: http_agent(),
            endpoint: endpoint.into(),
        }
    }
}

impl LogSink for HttpLogSink {
    fn post_log(&self, payload: &Value, filename: &str, meta: &SessionMeta) -> StoaResult<()> {
        let body = json!({
            "payload": payload,
            "filename": filename,
            "userId": meta.username,
            "sessionId": meta.session_id,
            "meta": meta_value(meta),
        });

        self.agent
            .post(&self.endpoint)
            .send_json(body)
            .map_err(map_http_error)?;
        Ok(())
    }
}

/// Fire-and-forget wrapper: research logging is best-effort, a failed upload
/// is logged and swallowed so it can never block the session.
pub fn post_best_effort(
    sink: &dyn LogSink,
    payload: &Value,
    filename: &str,
    meta: &SessionMeta,
) -> bool {
    match sink.post_log(payload, filename, meta) {
        Ok(()) => true,
        Err(err) => {
            warn!(filename, error = %err, "log upload failed");
            false
        }
    }
}

fn meta_value(meta: &SessionMeta) -> Value {
    json!({
        "language": meta.language,
        "version": "v1",
        "username": meta.username,
        "examTopic": meta.exam_topic,
        "turnCount": meta.turn_count,
    })
}
