use serde::Serialize;
use tokio::time::{sleep, Instant};

use super::dashboard_client::DashboardTransport;
use super::outcome::{classify, Outcome};
use super::payload::{DashboardRequest, DataFormat, OAuthToken, RetryPolicy, UploadTarget};

pub const ERROR_NO_OAUTH_TOKEN: &str = "no credentials provided, upload discarded";

/// Folded result of every attempt made for one batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub succeeded: bool,
    /// One entry per failed attempt, in attempt order
    pub errors: Vec<String>,
}

impl UploadReport {
    fn failed(errors: Vec<String>) -> Self {
        Self {
            succeeded: false,
            errors,
        }
    }
}

/// Sends results to the dashboard, logging the time spent and every error
/// collected along the way. Returns whether the batch was accepted.
pub async fn send_results<T, B>(
    transport: &T,
    batch: &B,
    target: &UploadTarget,
    credentials: Option<&OAuthToken>,
    policy: &RetryPolicy,
) -> bool
where
    T: DashboardTransport + ?Sized,
    B: Serialize + ?Sized,
{
    let start = Instant::now();

    let report = upload(transport, batch, target, credentials, policy).await;

    log::info!(
        "Time spent sending results to {}: {:.3}s",
        target.base_url,
        start.elapsed().as_secs_f64()
    );

    for error in &report.errors {
        log::warn!("{}", error);
    }

    report.succeeded
}

/// Delivers one batch with up to `policy.max_attempts()` attempts.
///
/// The batch is serialized once and the identical request is replayed on
/// every retry. Retryable outcomes move on to the next attempt, a fatal
/// outcome or a success ends the loop. Nothing here returns an error: every
/// failure ends up in the report.
pub async fn upload<T, B>(
    transport: &T,
    batch: &B,
    target: &UploadTarget,
    credentials: Option<&OAuthToken>,
    policy: &RetryPolicy,
) -> UploadReport
where
    T: DashboardTransport + ?Sized,
    B: Serialize + ?Sized,
{
    let data_type = target.format.label();

    let request = match prepare_request(batch, target, credentials) {
        Ok(request) => request,
        Err(error) => {
            log::error!("{}", error);
            return UploadReport::failed(vec![error]);
        }
    };

    let mut errors = Vec::new();
    let max_attempts = policy.max_attempts();

    for attempt in 1..=max_attempts {
        log::info!(
            "Sending {} result to dashboard (attempt {} out of {}).",
            data_type,
            attempt,
            max_attempts
        );

        let result = transport.post(&request).await;

        match classify(target.format, &result) {
            Outcome::Success => {
                log::info!("Uploaded {} data to {}", data_type, request.url);
                return UploadReport {
                    succeeded: true,
                    errors,
                };
            }
            Outcome::Retryable(message) => {
                let error = format!("Error while uploading {} data: {}", data_type, message);
                errors.push(error);

                if attempt == max_attempts {
                    log::warn!("Attempt {} failed, no attempts left: {}", attempt, message);
                    break;
                }

                log::warn!("Attempt {} failed, retrying: {}", attempt, message);
                if !policy.retry_delay().is_zero() {
                    sleep(policy.retry_delay()).await;
                }
            }
            Outcome::Fatal(message) => {
                let error = format!("Error uploading {} data: {}", data_type, message);
                log::error!("Attempt {} failed permanently: {}", attempt, error);
                errors.push(error);
                break;
            }
            Outcome::Unexpected(message) => {
                let error = unexpected_error(data_type, &message);
                log::error!("Attempt {} could not be sent: {}", attempt, error);
                errors.push(error);
                break;
            }
        }
    }

    UploadReport::failed(errors)
}

fn prepare_request<B>(
    batch: &B,
    target: &UploadTarget,
    credentials: Option<&OAuthToken>,
) -> Result<DashboardRequest, String>
where
    B: Serialize + ?Sized,
{
    let data_type = target.format.label();
    let unexpected = |e: &dyn std::fmt::Display| unexpected_error(data_type, e);

    // Checked before serializing so a discarded batch costs nothing.
    if target.format.requires_credentials() && credentials.is_none() {
        return Err(ERROR_NO_OAUTH_TOKEN.to_string());
    }

    let json = serde_json::to_string(batch).map_err(|e| unexpected(&e))?;

    match (target.format, credentials) {
        (DataFormat::Histograms, Some(token)) => {
            DashboardRequest::histograms(target, &json, token).map_err(|e| unexpected(&e))
        }
        _ => Ok(DashboardRequest::chart_json(target, &json)),
    }
}

fn unexpected_error(data_type: &str, error: &dyn std::fmt::Display) -> String {
    format!("Unexpected error while uploading {} data: {}", data_type, error)
}
