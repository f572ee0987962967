use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::{run_api, ApiState};
use crate::config::NodeConfig;
use crate::grpc::{GrpcServer, ScheduleServiceImpl};
use crate::intake::{IntakeValidator, LogicalClock, SubmissionConsumer};
use crate::queue::QueueRegistry;
use crate::scheduler::{
    JobStore, MemoryJobStore, MemoryScheduleStore, Recomputer, SchedulePublisher, ScheduleReader,
    ScheduleStore,
};

/// Owns every scheduler component and their lifecycle.
///
/// All collaborators are constructed here and handed to the components that
/// need them; nothing is global.
pub struct Node {
    pub config: NodeConfig,
    pub jobs: Arc<dyn JobStore>,
    pub queues: QueueRegistry,
    pub clock: Arc<LogicalClock>,
    pub validator: Arc<IntakeValidator>,
    pub recomputer: Arc<Recomputer>,
    pub reader: ScheduleReader,
}

impl Node {
    /// Node backed by the in-process job store, schedule store and queues.
    pub fn new(config: NodeConfig) -> Self {
        let jobs: Arc<dyn JobStore> = Arc::new(MemoryJobStore::with_capacity(config.max_jobs));
        let schedules: Arc<dyn ScheduleStore> = Arc::new(MemoryScheduleStore::new());
        let queues = QueueRegistry::in_memory(
            &config.categories,
            config.queue.capacity,
            config.queue.max_deliveries,
        );
        Self::with_backends(config, jobs, schedules, queues)
    }

    pub fn with_backends(
        config: NodeConfig,
        jobs: Arc<dyn JobStore>,
        schedules: Arc<dyn ScheduleStore>,
        queues: QueueRegistry,
    ) -> Self {
        let clock = Arc::new(LogicalClock::new());
        let validator = Arc::new(IntakeValidator::new(jobs.clone(), clock.clone()));
        let recomputer = Arc::new(Recomputer::new(
            jobs.clone(),
            SchedulePublisher::new(schedules.clone()),
        ));

        Self {
            config,
            jobs,
            queues,
            clock,
            validator,
            recomputer,
            reader: ScheduleReader::new(schedules),
        }
    }

    pub fn api_state(&self) -> ApiState {
        ApiState {
            queues: self.queues.clone(),
            reader: self.reader.clone(),
            jobs: self.jobs.clone(),
            clock: self.clock.clone(),
        }
    }

    pub fn schedule_service(&self) -> ScheduleServiceImpl {
        ScheduleServiceImpl::new(
            self.queues.clone(),
            self.reader.clone(),
            self.jobs.clone(),
            self.clock.clone(),
        )
    }

    /// Start one consumer task per configured category.
    pub fn spawn_consumers(&self, shutdown: &CancellationToken) -> Vec<JoinHandle<()>> {
        self.queues
            .categories()
            .into_iter()
            .filter_map(|category| {
                let queue = match self.queues.get(&category) {
                    Ok(queue) => queue,
                    Err(e) => {
                        tracing::error!(category = %category, error = %e, "No queue for category");
                        return None;
                    }
                };
                let consumer = SubmissionConsumer::new(
                    category,
                    queue,
                    self.validator.clone(),
                    self.jobs.clone(),
                    self.recomputer.clone(),
                );
                let token = shutdown.clone();
                Some(tokio::spawn(async move { consumer.run(token).await }))
            })
            .collect()
    }

    /// Run the node until `shutdown` is cancelled.
    ///
    /// 1. Publishes a schedule for whatever the job store already holds
    /// 2. Spawns one consumer per category queue
    /// 3. Optionally spawns the HTTP API
    /// 4. Runs the gRPC server (blocking)
    ///
    /// On shutdown the queues are closed and the consumers are awaited.
    ///
    /// # Errors
    ///
    /// Returns an error if the gRPC server fails to start or encounters a fatal error.
    pub async fn run(self, shutdown: CancellationToken) -> crate::error::Result<()> {
        match self.recomputer.recompute().await {
            Ok(ack) => tracing::info!(version = ack.version, entries = ack.entries, "Initial schedule published"),
            Err(e) => tracing::error!(error = %e, "Initial schedule recompute failed"),
        }

        let consumers = self.spawn_consumers(&shutdown);

        let api = self.config.http_addr.map(|addr| {
            let state = self.api_state();
            let token = shutdown.clone();
            tokio::spawn(async move { run_api(addr, state, token).await })
        });

        let service = self.schedule_service().with_shutdown(shutdown.clone());
        let server = GrpcServer::new(self.config.listen_addr, service);
        let served = server.run(shutdown.clone()).await;

        // Whatever stopped the server, stop everything else too.
        shutdown.cancel();
        self.queues.close_all().await;
        for handle in consumers {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Consumer task ended abnormally");
            }
        }
        if let Some(handle) = api {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "HTTP API server failed"),
                Err(e) => tracing::warn!(error = %e, "HTTP API task ended abnormally"),
            }
        }

        tracing::info!("Scheduler node stopped");
        served.map_err(Into::into)
    }
}
