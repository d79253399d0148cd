use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::config::OmniParserConfig;
use crate::errors::ProbeResult;
use crate::perception::filter::filter_by_text;
use crate::remote::poller::{JobPoller, PollSettings};
use crate::remote::transport::{CallTransport, HttpCallTransport};
use crate::remote::types::{ImageRef, JobRequest, ParseParams, PollOutcome};

/// Entry point for running parse jobs against a call/poll service.
///
/// Every `run_*` method drives a fresh `JobPoller` to a terminal outcome and
/// never returns `PollOutcome::Pending`.
pub struct RemoteJobClient {
    transport: Arc<dyn CallTransport>,
    settings: PollSettings,
    params: ParseParams,
}

impl RemoteJobClient {
    pub fn new(cfg: &OmniParserConfig) -> ProbeResult<Self> {
        cfg.validate()?;
        let transport = HttpCallTransport::new(cfg)?;
        tracing::debug!(url = %transport.call_url(), "remote job client ready");
        Ok(Self::with_transport(
            Arc::new(transport),
            PollSettings::from_config(cfg),
            ParseParams::from_config(cfg),
        ))
    }

    pub fn with_transport(
        transport: Arc<dyn CallTransport>,
        settings: PollSettings,
        params: ParseParams,
    ) -> Self {
        Self {
            transport,
            settings,
            params,
        }
    }

    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    /// Build a request for `image` using the configured model parameters.
    pub fn request_for(&self, image: ImageRef) -> JobRequest {
        JobRequest::new(image, self.params)
    }

    pub async fn run_job(&self, request: &JobRequest) -> PollOutcome {
        let outcome = JobPoller::new(self.transport.as_ref(), self.settings)
            .run(request)
            .await;
        log_outcome(&outcome);
        outcome
    }

    /// Like `run_job`, ending early as `Cancelled` once `stop_flag` is raised.
    pub async fn run_job_with_stop(
        &self,
        request: &JobRequest,
        stop_flag: Arc<AtomicBool>,
    ) -> PollOutcome {
        let outcome = JobPoller::new(self.transport.as_ref(), self.settings)
            .with_stop_flag(stop_flag)
            .run(request)
            .await;
        log_outcome(&outcome);
        outcome
    }

    /// Run a job and keep only elements whose text mentions `target`.
    pub async fn run_job_filtered(&self, request: &JobRequest, target: &str) -> PollOutcome {
        match self.run_job(request).await {
            PollOutcome::Succeeded(elements) => {
                PollOutcome::Succeeded(filter_by_text(&elements, target))
            }
            other => other,
        }
    }
}

fn log_outcome(outcome: &PollOutcome) {
    match outcome {
        PollOutcome::Succeeded(elements) => {
            tracing::info!(elements = elements.len(), "job succeeded")
        }
        PollOutcome::Failed(failure) => tracing::error!(error = %failure, "job failed"),
        PollOutcome::TimedOut {
            attempts,
            last_error,
        } => tracing::warn!(
            attempts,
            last_error = last_error.as_deref().unwrap_or("none"),
            "job timed out"
        ),
        PollOutcome::Cancelled { attempts } => tracing::info!(attempts, "job cancelled"),
        PollOutcome::Pending => tracing::error!("job poller stopped in a non-terminal state"),
    }
}
