// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The runtime-wide error type and its stable error codes.
//!
//! Every error that crosses a crate boundary is an [`ApiaryError`]. The
//! [`code`](ApiaryError::code) string is part of the external contract:
//! it appears in `error` events, in the `bot_errors_total{where,code}`
//! counter, and in the HTTP error envelope, so variants map onto a fixed
//! vocabulary rather than leaking implementation detail.

use thiserror::Error;

/// The primary error type used across the Apiary runtime.
#[derive(Debug, Error)]
pub enum ApiaryError {
    /// Configuration errors (bad TOML, unparseable env override).
    #[error("configuration error: {0}")]
    Config(String),

    /// The database pool is exhausted or the transport is down.
    #[error("database unavailable: {0}")]
    DbUnavailable(String),

    /// The SQL gatekeeper refused a statement.
    #[error("sql rejected: {0}")]
    SqlRejected(String),

    /// A `:name` placeholder has no matching bind value.
    #[error("unknown sql bind parameter :{0}")]
    SqlBindMissing(String),

    /// A gatekeeper-approved statement failed during execution.
    #[error("sql execution failed: {0}")]
    SqlFailed(String),

    /// Wizard step input did not match the step's validation regex.
    /// The payload is the user-facing `validate.msg`.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// Unknown template directive or iteration over a non-list.
    #[error("template error: {0}")]
    Template(String),

    /// A stored wizard state record could not be decoded.
    #[error("wizard state corrupt")]
    StateCorrupt,

    /// The per-bot LLM circuit breaker is open.
    #[error("circuit breaker open for bot {0}")]
    CircuitOpen(String),

    /// The per-(bot, user) LLM rate limit was exceeded.
    #[error("llm rate limit exceeded")]
    RateLimited,

    /// The bot's daily LLM token budget is spent.
    #[error("llm daily token budget exhausted")]
    BudgetExhausted,

    /// The handler deadline or an upstream timeout elapsed.
    #[error("deadline exceeded")]
    Timeout,

    /// An inline-keyboard callback addressed to a different user.
    #[error("callback addressed to another user")]
    CallbackOwnerMismatch,

    /// A bot spec failed to compile.
    #[error("invalid spec: {0}")]
    SpecInvalid(String),

    /// A referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Unexpected failures caught at the handler boundary.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiaryError {
    /// The stable error code used in events, metrics labels, and the
    /// HTTP error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            ApiaryError::Config(_) => "config_error",
            ApiaryError::DbUnavailable(_) => "db_unavailable",
            ApiaryError::SqlRejected(_) | ApiaryError::SqlFailed(_) => "sql_error",
            ApiaryError::SqlBindMissing(_) => "sql_bind_missing",
            ApiaryError::ValidationFailed(_) => "validation_failed",
            ApiaryError::Template(_) => "template_error",
            ApiaryError::StateCorrupt => "state_corrupt",
            ApiaryError::CircuitOpen(_) => "circuit_breaker_open",
            ApiaryError::RateLimited => "rate_limit_exceeded",
            ApiaryError::BudgetExhausted => "budget_exhausted",
            ApiaryError::Timeout => "timeout",
            ApiaryError::CallbackOwnerMismatch => "callback_owner_mismatch",
            ApiaryError::SpecInvalid(_) => "spec_invalid",
            ApiaryError::NotFound(_) => "not_found",
            ApiaryError::Internal(_) => "internal",
        }
    }

    /// True for LLM refusals that degrade to the unimproved text
    /// instead of failing the enclosing action.
    pub fn is_llm_refusal(&self) -> bool {
        matches!(
            self,
            ApiaryError::CircuitOpen(_)
                | ApiaryError::RateLimited
                | ApiaryError::BudgetExhausted
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ApiaryError::DbUnavailable("x".into()).code(), "db_unavailable");
        assert_eq!(ApiaryError::SqlRejected("x".into()).code(), "sql_error");
        assert_eq!(ApiaryError::SqlBindMissing("svc".into()).code(), "sql_bind_missing");
        assert_eq!(ApiaryError::CircuitOpen("b".into()).code(), "circuit_breaker_open");
        assert_eq!(ApiaryError::CallbackOwnerMismatch.code(), "callback_owner_mismatch");
    }

    #[test]
    fn llm_refusals_are_non_fatal() {
        assert!(ApiaryError::RateLimited.is_llm_refusal());
        assert!(ApiaryError::BudgetExhausted.is_llm_refusal());
        assert!(!ApiaryError::Timeout.is_llm_refusal());
    }
}
