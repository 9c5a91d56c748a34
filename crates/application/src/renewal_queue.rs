//! Outbound hand-off of projects whose calendar watch needs renewal.

use retention_core::{AppError, AppResult};
use retention_domain::ProjectId;
use tokio::sync::mpsc;

/// Creates a bounded renewal queue.
///
/// Publishing waits while `capacity` signals are buffered and unread, so the
/// renewer must drain the subscription concurrently with retention passes.
pub fn renewal_queue(capacity: usize) -> AppResult<(RenewalPublisher, RenewalSubscription)> {
    if capacity == 0 {
        return Err(AppError::Validation(
            "renewal queue capacity must be greater than zero".to_owned(),
        ));
    }

    let (sender, receiver) = mpsc::channel(capacity);
    Ok((
        RenewalPublisher { sender },
        RenewalSubscription { receiver },
    ))
}

/// Producing half of the renewal queue. Dropping it closes the queue.
#[derive(Debug)]
pub struct RenewalPublisher {
    sender: mpsc::Sender<ProjectId>,
}

impl RenewalPublisher {
    /// Publishes one renewal signal, waiting for buffer space.
    ///
    /// A dropped subscription never comes back, so the failure is not
    /// retriable.
    pub async fn publish(&self, project_id: ProjectId) -> AppResult<()> {
        self.sender.send(project_id).await.map_err(|_| {
            AppError::Internal(format!(
                "renewal queue closed before project {project_id} was delivered"
            ))
        })
    }
}

/// Consuming half of the renewal queue.
#[derive(Debug)]
pub struct RenewalSubscription {
    receiver: mpsc::Receiver<ProjectId>,
}

impl RenewalSubscription {
    /// Waits for the next signal. Returns `None` once the publisher is closed
    /// and every buffered signal has been read.
    pub async fn next(&mut self) -> Option<ProjectId> {
        self.receiver.recv().await
    }

    /// Returns a buffered signal without waiting.
    pub fn try_next(&mut self) -> Option<ProjectId> {
        self.receiver.try_recv().ok()
    }
}
