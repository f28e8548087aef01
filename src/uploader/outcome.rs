use crate::errors::TransportError;

use super::payload::DataFormat;

/// Error text marker for a rejected chart payload
const HTTP_400_MARKER: &str = "HTTPError: 400";

/// Status line of a response that made it back from the dashboard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub reason: String,
}

impl HttpReply {
    pub fn new(status: u16, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Result of a single delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Transient; the same payload may be sent again
    Retryable(String),
    /// Resending cannot help
    Fatal(String),
    /// The request could not even be built; fatal as well
    Unexpected(String),
}

pub fn classify(format: DataFormat, result: &Result<HttpReply, TransportError>) -> Outcome {
    match format {
        DataFormat::ChartJson => classify_chart_response(result),
        DataFormat::Histograms => classify_histogram_response(result),
    }
}

/// `/add_point`: any failure is retryable unless its error text carries an
/// HTTP 400, which means the dashboard rejected the JSON itself.
pub fn classify_chart_response(result: &Result<HttpReply, TransportError>) -> Outcome {
    let error = match result {
        Ok(reply) if reply.is_success() => return Outcome::Success,
        Ok(reply) => format!("HTTPError: {} {}", reply.status, reply.reason),
        Err(TransportError::Request(message)) => return Outcome::Unexpected(message.clone()),
        Err(TransportError::Connection(message)) => format!("URLError: {}", message),
    };

    if error.contains(HTTP_400_MARKER) {
        Outcome::Fatal(format!("Discarding JSON, error:\n{}", error))
    } else {
        Outcome::Retryable(error)
    }
}

/// `/add_histograms`: 403 is retried as a possibly transient auth failure,
/// every other non-200 status is final.
pub fn classify_histogram_response(result: &Result<HttpReply, TransportError>) -> Outcome {
    match result {
        Ok(reply) if reply.status == 200 => Outcome::Success,
        Ok(reply) if reply.status == 403 => {
            Outcome::Retryable(format!("HTTP Response {}: {}", reply.status, reply.reason))
        }
        Ok(reply) => Outcome::Fatal(format!("HTTP Response {}: {}", reply.status, reply.reason)),
        Err(TransportError::Request(message)) => Outcome::Unexpected(message.clone()),
        Err(TransportError::Connection(message)) => Outcome::Retryable(message.clone()),
    }
}
