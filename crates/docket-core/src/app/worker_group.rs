//! ListenerPool - in-process pool of listen loops.
//!
//! Each loop stops receiving on its own intake token, a child of the pool's
//! root, and is interrupted only by the root itself. Shrinking cancels the
//! intake of the newest loops; they finish their current batch and exit on
//! their own. `shutdown_and_join` cancels the root, which interrupts
//! in-flight tasks, and waits for every loop, retired ones included.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::app::listener::Listener;
use crate::app::task_queue::TaskQueue;
use crate::config::ListenerConfig;
use crate::ports::{PoolError, Transport, WorkerPool};
use crate::processor::ProcessorRegistry;

struct Slot {
    intake: CancellationToken,
    join: JoinHandle<()>,
}

#[derive(Default)]
struct PoolState {
    active: Vec<Slot>,
    retired: Vec<JoinHandle<()>>,
    next_seq: usize,
    closed: bool,
}

pub struct ListenerPool {
    worker_id: String,
    queue: Arc<TaskQueue>,
    transport: Arc<dyn Transport>,
    registry: ProcessorRegistry,
    config: ListenerConfig,
    root: CancellationToken,
    state: Mutex<PoolState>,
}

impl ListenerPool {
    pub fn new(
        worker_id: impl Into<String>,
        queue: Arc<TaskQueue>,
        transport: Arc<dyn Transport>,
        registry: ProcessorRegistry,
        config: ListenerConfig,
        root: CancellationToken,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            queue,
            transport,
            registry,
            config,
            root,
            state: Mutex::new(PoolState::default()),
        }
    }

    /// Stop every loop and wait for in-flight tasks to settle.
    pub async fn shutdown_and_join(&self) {
        let joins = {
            let mut state = self.state.lock().await;
            state.closed = true;
            let mut joins: Vec<JoinHandle<()>> = state.active.drain(..).map(|s| s.join).collect();
            joins.append(&mut state.retired);
            joins
        };
        self.root.cancel();
        for join in joins {
            if let Err(e) = join.await {
                warn!(worker_id = %self.worker_id, error = %e, "listen loop ended abnormally");
            }
        }
        info!(worker_id = %self.worker_id, "listener pool stopped");
    }

    fn spawn_loop(&self, seq: usize) -> Slot {
        let intake = self.root.child_token();
        let listener = Arc::new(Listener::new(
            format!("{}-{seq}", self.worker_id),
            self.queue.clone(),
            self.transport.clone(),
            self.registry.clone(),
            self.config.clone(),
        ));
        let join = tokio::spawn(listener.run(intake.clone(), self.root.clone()));
        Slot { intake, join }
    }
}

#[async_trait]
impl WorkerPool for ListenerPool {
    async fn size(&self) -> usize {
        self.state.lock().await.active.len()
    }

    async fn resize(&self, target: usize) -> Result<(), PoolError> {
        let mut state = self.state.lock().await;
        if state.closed || self.root.is_cancelled() {
            return Err(PoolError::ShuttingDown);
        }

        while state.active.len() < target {
            let seq = state.next_seq;
            state.next_seq += 1;
            let slot = self.spawn_loop(seq);
            state.active.push(slot);
        }
        while state.active.len() > target {
            let Some(slot) = state.active.pop() else { break };
            slot.intake.cancel();
            state.retired.push(slot.join);
        }
        // forget loops that already finished
        state.retired.retain(|j| !j.is_finished());

        info!(worker_id = %self.worker_id, size = state.active.len(), "listener pool resized");
        Ok(())
    }
}
