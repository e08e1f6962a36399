//! Queue contracts: submitting tasks and handling deliveries

use crate::{error::HandlerError, message::Message, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Enqueues tasks
#[async_trait]
pub trait Submitter: Send + Sync {
    /// Submit a task; returns once the queue acknowledges it
    async fn submit(&self, message: Message) -> Result<()>;
}

/// Processes delivered tasks
///
/// Delivery is at least once: the same message may be handled more than
/// once, and concurrently with other messages.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle a delivery
    async fn handle(&self, message: &Message) -> std::result::Result<(), HandlerError>;
}

/// Run `handler` with a deadline; expiry is a transient failure
pub(crate) async fn handle_within(
    handler: &dyn MessageHandler,
    message: &Message,
    deadline: Duration,
) -> std::result::Result<(), HandlerError> {
    match tokio::time::timeout(deadline, handler.handle(message)).await {
        Ok(result) => result,
        Err(_) => Err(HandlerError::Transient(format!(
            "handler timed out after {:?}",
            deadline
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stuck;

    #[async_trait]
    impl MessageHandler for Stuck {
        async fn handle(&self, _message: &Message) -> std::result::Result<(), HandlerError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    struct Quick;

    #[async_trait]
    impl MessageHandler for Quick {
        async fn handle(&self, _message: &Message) -> std::result::Result<(), HandlerError> {
            Err(HandlerError::Permanent("bad payload".to_string()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_handler_times_out() {
        let message = Message::new("t", vec![1]);
        let result = handle_within(&Stuck, &message, Duration::from_secs(30)).await;
        assert!(matches!(result, Err(HandlerError::Transient(_))));
    }

    #[tokio::test]
    async fn test_handler_result_passes_through() {
        let message = Message::new("t", vec![1]);
        let result = handle_within(&Quick, &message, Duration::from_secs(30)).await;
        assert_eq!(result, Err(HandlerError::Permanent("bad payload".to_string())));
    }
}
