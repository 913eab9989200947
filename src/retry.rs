use taxy::Error;

/// Bounded retry for the one failure a run can repair on its own: an access
/// token the history endpoint no longer accepts. Everything else fails the
/// run on first sight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    pub fn should_retry(&self, error: &Error, attempt: u32) -> bool {
        attempt < self.max_retries && error.is_auth()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth_error() -> Error {
        Error::Auth {
            code: 401,
            error: "invalid_token".to_string(),
            message: "expired".to_string(),
        }
    }

    #[test]
    fn retries_an_auth_failure_exactly_once() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(&auth_error(), 0));
        assert!(!policy.should_retry(&auth_error(), 1));
        assert!(!policy.should_retry(&auth_error(), 2));
    }

    #[test]
    fn never_retries_other_failures() {
        let policy = RetryPolicy::default();
        let err = Error::Request {
            code: 503,
            message: "unavailable".to_string(),
        };
        assert!(!policy.should_retry(&err, 0));
        assert!(!policy.should_retry(&Error::State("nope".to_string()), 0));
    }
}
