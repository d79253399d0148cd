/// Job poller: drives one submitted job from submission to a terminal outcome.
///
/// States: submitting → waiting for handle → polling → finished. Each poll
/// attempt waits `poll_delay`, checks the stop flag, then fetches once.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::config::OmniParserConfig;
use crate::remote::decoder::{decode_elements, decode_raw_result};
use crate::remote::event_stream::EventStreamReader;
use crate::remote::transport::CallTransport;
use crate::remote::types::{
    snippet, EventFrame, JobFailure, JobHandle, JobRequest, PollOutcome,
};

/// Longest prefix of a poll body written to trace logs.
const BODY_LOG_LIMIT: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub max_attempts: u32,
    pub poll_delay: Duration,
}

impl PollSettings {
    pub fn from_config(cfg: &OmniParserConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts,
            poll_delay: cfg.poll_delay(),
        }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from_config(&OmniParserConfig::default())
    }
}

enum PollState {
    Submitting,
    WaitingForHandle(String),
    Polling {
        handle: JobHandle,
        attempts: u32,
        last_error: Option<String>,
    },
    Finished(PollOutcome),
}

/// Single-use poller: `run` consumes it, so one instance never serves two jobs.
pub struct JobPoller<'t> {
    transport: &'t dyn CallTransport,
    settings: PollSettings,
    stop_flag: Option<Arc<AtomicBool>>,
}

impl<'t> JobPoller<'t> {
    pub fn new(transport: &'t dyn CallTransport, settings: PollSettings) -> Self {
        Self {
            transport,
            settings,
            stop_flag: None,
        }
    }

    /// Flag checked at every attempt boundary; when raised the run ends as `Cancelled`.
    pub fn with_stop_flag(mut self, stop_flag: Arc<AtomicBool>) -> Self {
        self.stop_flag = Some(stop_flag);
        self
    }

    fn stop_requested(&self) -> bool {
        self.stop_flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    pub async fn run(self, request: &JobRequest) -> PollOutcome {
        let mut state = PollState::Submitting;
        loop {
            state = match state {
                PollState::Submitting => self.submit(request).await,
                PollState::WaitingForHandle(reply) => match extract_handle(&reply) {
                    Ok(handle) => {
                        tracing::info!(handle = %handle, "job accepted");
                        PollState::Polling {
                            handle,
                            attempts: 0,
                            last_error: None,
                        }
                    }
                    Err(reason) => {
                        tracing::error!(reason = %reason, "submission reply missing job handle");
                        PollState::Finished(PollOutcome::Failed(JobFailure::Protocol(reason)))
                    }
                },
                PollState::Polling {
                    handle,
                    attempts,
                    last_error,
                } => self.poll_once(handle, attempts, last_error).await,
                PollState::Finished(outcome) => return outcome,
            };
        }
    }

    async fn submit(&self, request: &JobRequest) -> PollState {
        match self.transport.submit(&request.to_call_body()).await {
            Ok(reply) => PollState::WaitingForHandle(reply),
            Err(e) => {
                tracing::error!(error = %e, "job submission failed");
                PollState::Finished(PollOutcome::Failed(JobFailure::Transport(e)))
            }
        }
    }

    async fn poll_once(
        &self,
        handle: JobHandle,
        attempts: u32,
        mut last_error: Option<String>,
    ) -> PollState {
        if attempts >= self.settings.max_attempts {
            tracing::warn!(
                handle = %handle,
                attempts,
                last_error = last_error.as_deref().unwrap_or("none"),
                "no result before attempt limit"
            );
            return PollState::Finished(PollOutcome::TimedOut {
                attempts,
                last_error,
            });
        }

        tokio::time::sleep(self.settings.poll_delay).await;

        if self.stop_requested() {
            tracing::info!(handle = %handle, attempts, "polling cancelled");
            return PollState::Finished(PollOutcome::Cancelled { attempts });
        }

        let attempt = attempts + 1;
        match self.transport.fetch(&handle).await {
            Ok(body) => {
                tracing::trace!(
                    attempt,
                    body = %body.chars().take(BODY_LOG_LIMIT).collect::<String>(),
                    "poll response"
                );
                let outcome = evaluate_response(&body);
                if outcome.is_terminal() {
                    tracing::info!(handle = %handle, attempt, "job finished");
                    return PollState::Finished(outcome);
                }
                tracing::debug!(attempt, "result not ready");
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "poll fetch failed, will retry");
                last_error = Some(e.to_string());
            }
        }

        PollState::Polling {
            handle,
            attempts: attempt,
            last_error,
        }
    }
}

/// Pull the job handle out of a submission reply.
pub fn extract_handle(reply: &str) -> Result<JobHandle, String> {
    let value: Value = serde_json::from_str(reply).map_err(|e| {
        format!(
            "submission reply is not JSON ({e}): {}",
            snippet(reply)
        )
    })?;
    match value.get("event_id").and_then(Value::as_str) {
        Some(id) if !id.trim().is_empty() => Ok(JobHandle::new(id.trim())),
        _ => Err(format!(
            "submission reply has no event_id: {}",
            snippet(reply)
        )),
    }
}

/// Evaluate one poll body. Frames are taken in order; the first terminal one
/// (a result, or a payload that cannot be decoded) decides the outcome.
pub fn evaluate_response(body: &str) -> PollOutcome {
    for frame in EventStreamReader::new(body) {
        let payload = match frame {
            EventFrame::NoData => continue,
            EventFrame::Payload(payload) => payload,
        };

        let raw = match decode_raw_result(payload) {
            Ok(Some(raw)) => raw,
            Ok(None) => continue,
            Err(failure) => {
                tracing::error!(error = %failure, "undecodable result payload");
                return PollOutcome::Failed(JobFailure::Decode(failure));
            }
        };

        if let Some(location) = raw.marked_image_location() {
            tracing::debug!(marked_image = %location, "result carries marked image");
        }

        return match decode_elements(&raw) {
            Ok(elements) => PollOutcome::Succeeded(elements),
            Err(failure) => {
                tracing::error!(error = %failure, "undecodable element list");
                PollOutcome::Failed(JobFailure::Decode(failure))
            }
        };
    }
    PollOutcome::Pending
}
