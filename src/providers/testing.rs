//! Scripted transport for gateway and router tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{TransportError, UpstreamRequest, UpstreamResponse, UpstreamTransport};

/// What the fake does on one call.
#[derive(Debug, Clone)]
pub(crate) enum Step {
    Respond(UpstreamResponse),
    Fail(String),
    /// Never answers within any sane deadline.
    Hang,
}

impl Step {
    pub(crate) fn json(status: u16, body: &str) -> Self {
        Self::Respond(UpstreamResponse::json(status, body))
    }

    pub(crate) fn with_content_type(status: u16, content_type: &str, body: &str) -> Self {
        Self::Respond(UpstreamResponse {
            status,
            content_type: Some(content_type.to_string()),
            body: body.to_string(),
        })
    }
}

/// Plays back a fixed list of steps and counts calls. Once the script runs
/// out, every further call gets the last step again.
pub(crate) struct FakeTransport {
    steps: Mutex<VecDeque<Step>>,
    last: Mutex<Option<Step>>,
    calls: AtomicU32,
    requests: Mutex<Vec<(String, UpstreamRequest)>>,
}

impl FakeTransport {
    pub(crate) fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            last: Mutex::new(None),
            calls: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// `(api_key, request)` pairs seen so far.
    pub(crate) fn requests(&self) -> Vec<(String, UpstreamRequest)> {
        self.requests.lock().unwrap().clone()
    }

    fn next_step(&self) -> Step {
        let mut last = self.last.lock().unwrap();
        if let Some(step) = self.steps.lock().unwrap().pop_front() {
            *last = Some(step.clone());
            return step;
        }
        last.clone()
            .unwrap_or_else(|| Step::Fail("fake transport has no script".into()))
    }
}

#[async_trait]
impl UpstreamTransport for FakeTransport {
    async fn send(
        &self,
        api_key: &str,
        request: &UpstreamRequest,
    ) -> Result<UpstreamResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap()
            .push((api_key.to_string(), request.clone()));

        match self.next_step() {
            Step::Respond(resp) => Ok(resp),
            Step::Fail(msg) => Err(TransportError::Connect(msg)),
            Step::Hang => {
                tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
                Err(TransportError::Request("hung call was not aborted".into()))
            }
        }
    }

    fn name(&self) -> &str {
        "fake"
    }
}
