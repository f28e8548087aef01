// Uploader module - delivers benchmark results to the performance dashboard
//
// Requests are built once per batch, posted through a `DashboardTransport`,
// and each reply is classified into success, retryable or fatal.

pub mod dashboard_client;
pub mod outcome;
pub mod payload;
pub mod retry;

pub use dashboard_client::{DashboardClient, DashboardTransport};
pub use outcome::{HttpReply, Outcome};
pub use payload::{DataFormat, OAuthToken, RetryPolicy, UploadTarget};
pub use retry::{send_results, upload, UploadReport, ERROR_NO_OAUTH_TOKEN};
