use std::thread;
use std::time::Duration;
use ureq::{Agent, Error as UreqError};

use crate::error::ServiceError;

const TIMEOUT_RESOLVE: Duration = Duration::from_secs(5);
const TIMEOUT_CONNECT: Duration = Duration::from_secs(5);
const TIMEOUT_SEND_REQUEST: Duration = Duration::from_secs(5);
const TIMEOUT_SEND_BODY: Duration = Duration::from_secs(15);
const TIMEOUT_RECV_RESPONSE: Duration = Duration::from_secs(30);

const RETRY_BASE_MS: u64 = 200;
pub const MAX_RETRIES: usize = 2;

/// Agent whose whole-call budget is `call_timeout`; completions stream
/// slowly, so the body read gets the same budget.
pub fn default_agent(call_timeout: Duration) -> Agent {
    let config = Agent::config_builder()
        .timeout_global(Some(call_timeout))
        .timeout_per_call(Some(call_timeout))
        .timeout_resolve(Some(TIMEOUT_RESOLVE))
        .timeout_connect(Some(TIMEOUT_CONNECT))
        .timeout_send_request(Some(TIMEOUT_SEND_REQUEST))
        .timeout_send_body(Some(TIMEOUT_SEND_BODY))
        .timeout_recv_response(Some(TIMEOUT_RECV_RESPONSE.min(call_timeout)))
        .timeout_recv_body(Some(call_timeout))
        .build();
    config.into()
}

pub fn should_retry(err: &UreqError) -> bool {
    match err {
        UreqError::StatusCode(code) => *code == 429 || (500..=599).contains(code),
        UreqError::Timeout(_)
        | UreqError::Io(_)
        | UreqError::HostNotFound
        | UreqError::ConnectionFailed
        | UreqError::TooManyRedirects
        | UreqError::RedirectFailed => true,
        _ => false,
    }
}

pub fn retry_delay(attempt: usize) -> Duration {
    let shift = attempt.min(6) as u32;
    let delay = RETRY_BASE_MS.saturating_mul(1_u64 << shift);
    Duration::from_millis(delay)
}

fn service_error(err: UreqError) -> ServiceError {
    match err {
        UreqError::StatusCode(code) => ServiceError::Failed(format!("http status {code}")),
        other => ServiceError::Network(other.to_string()),
    }
}

/// POST `body` as JSON and return the raw response text, retrying
/// rate limits, server errors and transport failures with backoff.
pub fn post_json(
    agent: &Agent,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
) -> Result<String, ServiceError> {
    let mut attempt = 0;
    loop {
        let mut request = agent.post(url);
        if let Some(token) = bearer {
            request = request.header("Authorization", &format!("Bearer {token}"));
        }
        match request.send_json(body) {
            Ok(response) => {
                return response
                    .into_body()
                    .read_to_string()
                    .map_err(|e| ServiceError::Network(format!("{e}")));
            }
            Err(err) => {
                if should_retry(&err) && attempt < MAX_RETRIES {
                    tracing::debug!(url, attempt, error = %err, "retrying request");
                    thread::sleep(retry_delay(attempt));
                    attempt += 1;
                    continue;
                }
                return Err(service_error(err));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_grows_and_caps() {
        assert_eq!(retry_delay(0), Duration::from_millis(200));
        assert_eq!(retry_delay(1), Duration::from_millis(400));
        assert_eq!(retry_delay(6), retry_delay(20));
    }

    #[test]
    fn rate_limits_and_server_errors_are_retried() {
        assert!(should_retry(&UreqError::StatusCode(429)));
        assert!(should_retry(&UreqError::StatusCode(503)));
        assert!(!should_retry(&UreqError::StatusCode(401)));
        assert!(should_retry(&UreqError::ConnectionFailed));
    }

    #[test]
    fn status_errors_map_to_failed() {
        assert_eq!(
            service_error(UreqError::StatusCode(401)),
            ServiceError::Failed("http status 401".into())
        );
        assert!(matches!(
            service_error(UreqError::HostNotFound),
            ServiceError::Network(_)
        ));
    }
}
