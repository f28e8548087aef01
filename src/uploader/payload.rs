use std::fmt;
use std::io::Write;
use std::time::Duration;

use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::errors::{AppError, AppResult};

/// Dashboard paths for the two payload kinds
pub const SEND_RESULTS_PATH: &str = "/add_point";
pub const SEND_HISTOGRAMS_PATH: &str = "/add_histograms";

pub const USER_AGENT: &str = "perf-uploader/1.0";

/// Default number of delivery attempts per upload
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    /// Legacy point-based results posted as form data
    ChartJson,
    /// HistogramSet posted as a compressed body with bearer auth
    Histograms,
}

impl DataFormat {
    pub fn endpoint_path(self) -> &'static str {
        match self {
            DataFormat::ChartJson => SEND_RESULTS_PATH,
            DataFormat::Histograms => SEND_HISTOGRAMS_PATH,
        }
    }

    /// Name used in log lines and error messages
    pub fn label(self) -> &'static str {
        match self {
            DataFormat::ChartJson => "chartjson",
            DataFormat::Histograms => "histogram",
        }
    }

    pub fn requires_credentials(self) -> bool {
        matches!(self, DataFormat::Histograms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub base_url: String,
    pub format: DataFormat,
}

impl UploadTarget {
    pub fn new(base_url: impl Into<String>, format: DataFormat) -> Self {
        Self {
            base_url: base_url.into(),
            format,
        }
    }

    pub fn chart_json(base_url: impl Into<String>) -> Self {
        Self::new(base_url, DataFormat::ChartJson)
    }

    pub fn histograms(base_url: impl Into<String>) -> Self {
        Self::new(base_url, DataFormat::Histograms)
    }

    pub fn endpoint_url(&self) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            self.format.endpoint_path()
        )
    }
}

/// Bearer token for histogram uploads. The caller owns its lifetime; it is
/// never refreshed here.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthToken(String);

impl OAuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OAuthToken(***)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Always at least one; only `new` and `default` set it
    max_attempts: u32,
    /// Pause between attempts. Zero retries immediately.
    retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> AppResult<Self> {
        if max_attempts == 0 {
            return Err(AppError::validation(
                "max_attempts",
                "Must allow at least one attempt",
            ));
        }

        Ok(Self {
            max_attempts,
            retry_delay: Duration::ZERO,
        })
    }

    pub fn with_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    /// application/x-www-form-urlencoded fields
    Form(Vec<(String, String)>),
    /// zlib-compressed JSON
    Compressed(Vec<u8>),
}

/// A fully built POST, reused verbatim for every attempt of one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl DashboardRequest {
    pub fn chart_json(target: &UploadTarget, results_json: &str) -> Self {
        Self {
            url: target.endpoint_url(),
            headers: Vec::new(),
            body: RequestBody::Form(vec![("data".to_string(), results_json.to_string())]),
        }
    }

    pub fn histograms(
        target: &UploadTarget,
        histogramset_json: &str,
        oauth_token: &OAuthToken,
    ) -> AppResult<Self> {
        let body = compress(histogramset_json.as_bytes())?;

        Ok(Self {
            url: target.endpoint_url(),
            headers: vec![
                (
                    "Authorization".to_string(),
                    format!("Bearer {}", oauth_token.as_str()),
                ),
                ("User-Agent".to_string(), USER_AGENT.to_string()),
            ],
            body: RequestBody::Compressed(body),
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

pub fn compress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::ZlibDecoder;
    use std::io::Read;

    #[test]
    fn test_endpoint_urls() {
        let chart = UploadTarget::chart_json("https://chromeperf.appspot.com");
        assert_eq!(chart.endpoint_url(), "https://chromeperf.appspot.com/add_point");

        let histograms = UploadTarget::histograms("https://chromeperf.appspot.com/");
        assert_eq!(
            histograms.endpoint_url(),
            "https://chromeperf.appspot.com/add_histograms"
        );
    }

    #[test]
    fn test_chart_request_is_single_data_field() {
        let target = UploadTarget::chart_json("http://localhost:8080");
        let request = DashboardRequest::chart_json(&target, r#"{"foo":1}"#);

        assert_eq!(request.url, "http://localhost:8080/add_point");
        assert!(request.headers.is_empty());
        assert_eq!(
            request.body,
            RequestBody::Form(vec![("data".to_string(), r#"{"foo":1}"#.to_string())])
        );
    }

    #[test]
    fn test_histogram_request_headers_and_body() {
        let target = UploadTarget::histograms("http://localhost:8080");
        let token = OAuthToken::new("fake-oauth");
        let request = DashboardRequest::histograms(&target, r#"[{"name":"a"}]"#, &token).unwrap();

        assert_eq!(request.url, "http://localhost:8080/add_histograms");
        assert_eq!(request.header("authorization"), Some("Bearer fake-oauth"));
        assert_eq!(request.header("User-Agent"), Some("perf-uploader/1.0"));

        let RequestBody::Compressed(bytes) = &request.body else {
            panic!("histogram body should be compressed");
        };
        let mut inflated = String::new();
        ZlibDecoder::new(bytes.as_slice())
            .read_to_string(&mut inflated)
            .unwrap();
        assert_eq!(inflated, r#"[{"name":"a"}]"#);
    }

    #[test]
    fn test_retry_policy_bounds() {
        assert!(matches!(
            RetryPolicy::new(0),
            Err(AppError::Validation { .. })
        ));
        assert_eq!(RetryPolicy::new(5).unwrap().max_attempts(), 5);
        assert_eq!(RetryPolicy::default().max_attempts(), 3);
        assert_eq!(RetryPolicy::default().retry_delay(), Duration::ZERO);

        let delayed = RetryPolicy::new(2)
            .unwrap()
            .with_delay(Duration::from_millis(100));
        assert_eq!(delayed.max_attempts(), 2);
        assert_eq!(delayed.retry_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = OAuthToken::new("secret-value");
        assert_eq!(format!("{:?}", token), "OAuthToken(***)");
        assert_eq!(token.as_str(), "secret-value");
    }
}
