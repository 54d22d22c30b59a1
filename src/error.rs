use thiserror::Error;

/// Errors raised by the trading engine and its collaborators.
///
/// Every variant except `MissingBuyOrder` is transient: the tick that hit it
/// is abandoned and the next scheduled tick tries again.
#[derive(Debug, Error)]
pub enum TradeError {
    /// Collaborator reported a failure (network, exchange error body, ...)
    #[error("gateway error: {0}")]
    Gateway(String),

    /// The exchange refused the order
    #[error("order rejected: {0}")]
    Rejected(String),

    /// The exchange has no open order with this id (executed, cancelled or unknown)
    #[error("order not found: {0}")]
    OrderNotFound(String),

    /// A collaborator call exceeded its time budget
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body did not have the expected shape
    #[error("unexpected response: {0}")]
    Parse(String),

    /// Selling without a recorded buy order. Only reachable through a broken transition.
    #[error("no last buy order recorded while selling")]
    MissingBuyOrder,
}

impl TradeError {
    /// True for failures the next tick may recover from
    pub fn is_transient(&self) -> bool {
        !matches!(self, TradeError::MissingBuyOrder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message() {
        let err = TradeError::Timeout {
            operation: "cancel_order",
            timeout_ms: 1500,
        };
        assert_eq!(err.to_string(), "cancel_order timed out after 1500ms");
        assert!(err.is_transient());
    }

    #[test]
    fn test_order_not_found_message() {
        let err = TradeError::OrderNotFound("abc".to_string());
        assert_eq!(err.to_string(), "order not found: abc");
        assert!(err.is_transient());
    }

    #[test]
    fn test_missing_buy_order_is_not_transient() {
        assert!(!TradeError::MissingBuyOrder.is_transient());
    }
}
