use ethers::providers::MiddlewareError;
use pingpong_core::ChainCommunicationError;

/// JSON-RPC error code providers use for "limit exceeded".
const QUOTA_EXCEEDED_CODE: i64 = -32005;
const TOO_MANY_REQUESTS_CODE: i64 = 429;

const QUOTA_EXCEEDED_MESSAGES: [&str; 4] = [
    "limit exceeded",
    "rate exceeded",
    "request rate limited",
    "too many requests",
];

/// Whether an RPC failure means the account's request quota is used up.
pub fn quota_exceeded(code: Option<i64>, message: &str) -> bool {
    if matches!(code, Some(QUOTA_EXCEEDED_CODE | TOO_MANY_REQUESTS_CODE)) {
        return true;
    }
    let message = message.to_lowercase();
    QUOTA_EXCEEDED_MESSAGES
        .iter()
        .any(|needle| message.contains(needle))
}

/// Convert a middleware error, singling out quota exhaustion.
pub(crate) fn classify<E: MiddlewareError + 'static>(err: E) -> ChainCommunicationError {
    let code = err.as_error_response().map(|response| response.code);
    let message = err.to_string();
    if quota_exceeded(code, &message) {
        ChainCommunicationError::QuotaExceeded(message)
    } else {
        ChainCommunicationError::from_other(err)
    }
}

#[cfg(test)]
mod test {
    use super::quota_exceeded;

    #[test]
    fn recognises_quota_errors() {
        assert!(quota_exceeded(Some(-32005), "whatever"));
        assert!(quota_exceeded(Some(429), ""));
        assert!(quota_exceeded(None, "daily request count exceeded, request rate limited"));
        assert!(quota_exceeded(None, "Monthly capacity Limit Exceeded"));
        assert!(quota_exceeded(Some(-32000), "compute units per second rate exceeded"));
    }

    #[test]
    fn other_errors_are_not_quota_errors() {
        assert!(!quota_exceeded(Some(-32000), "nonce too low"));
        assert!(!quota_exceeded(None, "connection refused"));
    }
}
