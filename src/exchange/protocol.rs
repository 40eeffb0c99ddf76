use std::sync::Arc;

use tokio::sync::mpsc;

use crate::surrogate::{SurrogateArtifact, SurrogateBatch};

/// The sealed state a replica hands over at a checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapMessage {
    pub params: Vec<f32>,
    /// The log prior density of `params`.
    pub auxiliary: f64,
    /// The log-likelihood of `params` with the temperature scaling undone.
    pub scaled_log_likelihood: f64,
    pub temperature: f64,
    pub iteration: usize,
}

/// The coordinator's answer to a checkpoint.
#[derive(Debug)]
pub struct Resume {
    /// The message the replica continues from, its own or its neighbour's.
    pub message: SwapMessage,
    /// Whether `message` comes from another replica.
    pub exchanged: bool,
    /// The surrogate version released for the next segment.
    pub artifact: Option<Arc<SurrogateArtifact>>,
}

/// The replica's end of its link to the coordinator, used from a blocking thread.
///
/// Dropping it, by returning or unwinding, is how a replica tells the coordinator it is done.
#[derive(Debug)]
pub struct ReplicaLink {
    ready: mpsc::Sender<SwapMessage>,
    batches: mpsc::UnboundedSender<SurrogateBatch>,
    resumes: mpsc::Receiver<Resume>,
}

/// The coordinator's end of its link to one replica.
#[derive(Debug)]
pub struct CoordinatorLink {
    ready: mpsc::Receiver<SwapMessage>,
    batches: mpsc::UnboundedReceiver<SurrogateBatch>,
    resumes: mpsc::Sender<Resume>,
}

/// Creates the pair of channels ends linking a replica to the coordinator.
pub fn link() -> (ReplicaLink, CoordinatorLink) {
    let (ready_tx, ready_rx) = mpsc::channel(1);
    let (batches_tx, batches_rx) = mpsc::unbounded_channel();
    let (resumes_tx, resumes_rx) = mpsc::channel(1);

    let replica = ReplicaLink {
        ready: ready_tx,
        batches: batches_tx,
        resumes: resumes_rx,
    };
    let coordinator = CoordinatorLink {
        ready: ready_rx,
        batches: batches_rx,
        resumes: resumes_tx,
    };

    (replica, coordinator)
}

impl ReplicaLink {
    /// Hands over the training batch and the swap message, then blocks until released.
    ///
    /// # Returns
    /// `None` if the coordinator is gone.
    pub fn checkpoint(
        &mut self,
        message: SwapMessage,
        batch: Option<SurrogateBatch>,
    ) -> Option<Resume> {
        if let Some(batch) = batch {
            self.batches.send(batch).ok()?;
        }

        self.ready.blocking_send(message).ok()?;
        self.resumes.blocking_recv()
    }
}

impl CoordinatorLink {
    /// Waits for the replica's next checkpoint.
    ///
    /// # Returns
    /// `None` once the replica has terminated, whether it finished or died.
    pub async fn await_ready(&mut self) -> Option<SwapMessage> {
        self.ready.recv().await
    }

    /// Takes every batch queued by the replica without waiting for more.
    pub fn drain_batches(&mut self) -> Vec<SurrogateBatch> {
        let mut batches = Vec::new();
        while let Ok(batch) = self.batches.try_recv() {
            batches.push(batch);
        }
        batches
    }

    /// Lets the replica continue.
    ///
    /// # Returns
    /// Whether the replica was still there to receive it.
    pub async fn release(&self, resume: Resume) -> bool {
        self.resumes.send(resume).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use tokio::task;

    use super::*;

    fn message(iteration: usize) -> SwapMessage {
        SwapMessage {
            params: vec![1.0, 2.0],
            auxiliary: -3.0,
            scaled_log_likelihood: -10.0,
            temperature: 1.0,
            iteration,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn checkpoint_round_trip() {
        let (mut replica, mut coordinator) = link();

        let handle = task::spawn_blocking(move || {
            let mut batch = SurrogateBatch::new(2);
            batch.push(&[1.0, 2.0], -10.0);
            replica.checkpoint(message(50), Some(batch))
        });

        let posted = coordinator.await_ready().await.unwrap();
        assert_eq!(posted, message(50));

        let batches = coordinator.drain_batches();
        assert_eq!(batches.len(), 1);
        assert!(coordinator.drain_batches().is_empty());

        let resume = Resume {
            message: message(51),
            exchanged: true,
            artifact: None,
        };
        assert!(coordinator.release(resume).await);

        let resumed = handle.await.unwrap().unwrap();
        assert!(resumed.exchanged);
        assert_eq!(resumed.message.iteration, 51);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn terminated_replica_closes_its_link() {
        let (replica, mut coordinator) = link();
        drop(replica);

        assert!(coordinator.await_ready().await.is_none());
        let resume = Resume {
            message: message(0),
            exchanged: false,
            artifact: None,
        };
        assert!(!coordinator.release(resume).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn vanished_coordinator_detaches_replica() {
        let (mut replica, coordinator) = link();
        drop(coordinator);

        let resumed = task::spawn_blocking(move || replica.checkpoint(message(50), None))
            .await
            .unwrap();
        assert!(resumed.is_none());
    }
}
