//! Survey submission client for the pre-test and post-test instruments.
//!
//! The forms themselves are external; this client only delivers the flat
//! response bag: `{username, language, responses}`.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::json;

use stoa_core::{Language, StoaResult};

use crate::{http_agent, map_http_error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurveyKind {
    Pre,
    Post,
}

impl fmt::Display for SurveyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pre => write!(f, "pretest"),
            Self::Post => write!(f, "posttest"),
        }
    }
}

pub struct SurveyClient {
    agent: ureq::Agent,
    pretest_endpoint: String,
    posttest_endpoint: String,
}

impl SurveyClient {
    pub fn new(pretest_endpoint: impl Into<String>, posttest_endpoint: impl Into<String>) -> Self {
        Self {
            agent: http_agent(),
            pretest_endpoint: pretest_endpoint.into(),
            posttest_endpoint: posttest_endpoint.into(),
        }
    }

    /// Submit one response bag. Responses are question-id to answer-text;
    /// multi-select answers arrive pre-joined with `|` by the caller.
    pub fn submit(
        &self,
        kind: SurveyKind,
        username: &str,
        language: Language,
        responses: &BTreeMap<String, String>,
    ) -> StoaResult<()> {
        let endpoint = match kind {
            SurveyKind::Pre => &self.pretest_endpoint,
            SurveyKind::Post => &self.posttest_endpoint,
        };
        let body = json!({
            "username": username,
            "language": language,
            "responses": responses,
        });

        self.agent
            .post(endpoint)
            .send_json(body)
            .map_err(map_http_error)?;
        Ok(())
    }
}
