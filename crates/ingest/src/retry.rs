//! 접속 재시도 정책
//!
//! [`RetryPolicy`]는 최대 시도 횟수, 지수 백오프 기준, 시도당 타임아웃과
//! 에러 분류 규칙만 담는 값 객체입니다. 실제 대기/반복은 [`SessionPool`](crate::session::SessionPool)이 수행합니다.

use std::time::Duration;

use crate::error::SessionError;

/// 실패한 시도 뒤의 결정
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// 백오프 후 다시 시도
    Retry,
    /// 즉시 실패 반환
    Fail,
}

/// 지수 백오프 재시도 정책
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1), Duration::from_secs(30))
    }
}

impl RetryPolicy {
    /// 새 정책을 만듭니다. `max_attempts`는 최소 1로 보정됩니다.
    pub fn new(max_attempts: u32, base_delay: Duration, attempt_timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            attempt_timeout,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// `failed_attempt`번째(0부터) 시도가 실패한 뒤 기다릴 시간: `base * 2^failed_attempt`
    pub fn delay_for(&self, failed_attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(failed_attempt.min(16)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// 에러를 재시도 가능 여부로 분류합니다.
    pub fn classify(&self, err: &SessionError) -> RetryDecision {
        if err.is_retryable() {
            RetryDecision::Retry
        } else {
            RetryDecision::Fail
        }
    }

    /// `failed_attempt`번째 시도 실패 후 다음 시도를 해야 하는지 판단합니다.
    pub fn should_retry(&self, failed_attempt: u32, err: &SessionError) -> bool {
        failed_attempt + 1 < self.max_attempts && self.classify(err) == RetryDecision::Retry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_from_base() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
    }

    #[test]
    fn delay_saturates_for_large_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(30));
        assert_eq!(policy.delay_for(40), Duration::from_secs(65_536));
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        let policy = RetryPolicy::new(0, Duration::ZERO, Duration::from_secs(1));
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn auth_failure_is_terminal() {
        let policy = RetryPolicy::default();
        let err = SessionError::Auth {
            host: "h".to_owned(),
            user: "u".to_owned(),
            reason: "denied".to_owned(),
        };
        assert_eq!(policy.classify(&err), RetryDecision::Fail);
        assert!(!policy.should_retry(0, &err));
    }

    #[test]
    fn transient_failure_retries_until_cap() {
        let policy = RetryPolicy::default();
        let err = SessionError::Unreachable {
            host: "h".to_owned(),
            reason: "connection reset".to_owned(),
        };
        assert_eq!(policy.classify(&err), RetryDecision::Retry);
        assert!(policy.should_retry(0, &err));
        assert!(policy.should_retry(1, &err));
        assert!(!policy.should_retry(2, &err));
    }
}
