use std::pin::Pin;
use std::sync::Arc;

use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};

use crate::error::QueueError;
use crate::intake::{LogicalClock, RawDependency, RawPriority, Submission};
use crate::proto::schedule_service_server::ScheduleService;
use crate::proto::{
    GetScheduledJobsRequest, GetScheduledJobsResponse, JobInfo, ListJobsRequest,
    ListJobsResponse, ScheduledJob, SubmitJobRequest, SubmitJobResponse,
};
use crate::queue::QueueRegistry;
use crate::scheduler::{Category, Job, JobStore, ScheduleEntry, ScheduleReader};

/// gRPC service for producers and schedule consumers
pub struct ScheduleServiceImpl {
    queues: QueueRegistry,
    reader: ScheduleReader,
    jobs: Arc<dyn JobStore>,
    clock: Arc<LogicalClock>,
    shutdown: CancellationToken,
}

impl ScheduleServiceImpl {
    pub fn new(
        queues: QueueRegistry,
        reader: ScheduleReader,
        jobs: Arc<dyn JobStore>,
        clock: Arc<LogicalClock>,
    ) -> Self {
        Self {
            queues,
            reader,
            jobs,
            clock,
            shutdown: CancellationToken::new(),
        }
    }

    /// End open schedule streams when `shutdown` is cancelled.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    async fn filtered_schedule(
        &self,
        category: &str,
    ) -> Result<(u64, Vec<ScheduleEntry>), Status> {
        let category = category_filter(category);
        let schedule = self
            .reader
            .current()
            .await
            .map_err(|e| Status::unavailable(e.to_string()))?;
        Ok((schedule.version, schedule.filtered(category.as_ref())))
    }
}

type ScheduleStream =
    Pin<Box<dyn tokio_stream::Stream<Item = Result<GetScheduledJobsResponse, Status>> + Send>>;

#[tonic::async_trait]
impl ScheduleService for ScheduleServiceImpl {
    type StreamScheduleStream = ScheduleStream;

    async fn submit_job(
        &self,
        request: Request<SubmitJobRequest>,
    ) -> Result<Response<SubmitJobResponse>, Status> {
        let req = request.into_inner();
        let category = Category::new(req.category);

        let queue = self
            .queues
            .get(&category)
            .map_err(|e| Status::not_found(e.to_string()))?;

        let submission = Submission {
            name: Some(req.name),
            priority: (!req.priority.is_empty()).then_some(RawPriority::Named(req.priority)),
            dependency: Some(RawDependency::Text(req.dependency)),
            time_stamp: None,
        };
        submission
            .normalize()
            .map_err(|e| Status::invalid_argument(e.to_string()))?;

        let time_stamp = self.clock.now();
        let submission = submission.stamped(time_stamp);

        queue
            .publish(submission.to_json())
            .await
            .map_err(|e| match e {
                QueueError::Full { .. } => Status::resource_exhausted(e.to_string()),
                _ => Status::unavailable(e.to_string()),
            })?;

        tracing::debug!(category = %category, time_stamp, "Submission enqueued via gRPC");
        Ok(Response::new(SubmitJobResponse {
            accepted: true,
            category: category.to_string(),
            time_stamp,
        }))
    }

    async fn get_scheduled_jobs(
        &self,
        request: Request<GetScheduledJobsRequest>,
    ) -> Result<Response<GetScheduledJobsResponse>, Status> {
        let req = request.into_inner();
        let (version, entries) = self.filtered_schedule(&req.category).await?;

        Ok(Response::new(GetScheduledJobsResponse {
            jobs: entries.into_iter().map(entry_to_proto).collect(),
            version,
        }))
    }

    async fn stream_schedule(
        &self,
        request: Request<GetScheduledJobsRequest>,
    ) -> Result<Response<Self::StreamScheduleStream>, Status> {
        let req = request.into_inner();
        let category = category_filter(&req.category);
        let mut updates = self.reader.subscribe();
        let shutdown = self.shutdown.clone();

        let (tx, rx) = tokio::sync::mpsc::channel(32);
        tokio::spawn(async move {
            loop {
                let schedule = updates.borrow_and_update().clone();
                let message = GetScheduledJobsResponse {
                    jobs: schedule
                        .filtered(category.as_ref())
                        .into_iter()
                        .map(entry_to_proto)
                        .collect(),
                    version: schedule.version,
                };
                if tx.send(Ok(message)).await.is_err() {
                    // Client disconnected
                    break;
                }

                tokio::select! {
                    changed = updates.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = tx.closed() => break,
                    _ = shutdown.cancelled() => break,
                }
            }
            tracing::debug!("Schedule stream closed");
        });

        let stream = ReceiverStream::new(rx);
        Ok(Response::new(Box::pin(stream) as Self::StreamScheduleStream))
    }

    async fn list_jobs(
        &self,
        request: Request<ListJobsRequest>,
    ) -> Result<Response<ListJobsResponse>, Status> {
        let req = request.into_inner();

        let page_size = if req.page_size == 0 {
            100
        } else {
            req.page_size.min(1000)
        } as usize;

        // Offset-based: the token is the starting index
        let offset: usize = if req.page_token.is_empty() {
            0
        } else {
            req.page_token
                .parse()
                .map_err(|_| Status::invalid_argument("Invalid page token"))?
        };

        let all_jobs = self
            .jobs
            .list_ordered()
            .await
            .map_err(|e| Status::unavailable(e.to_string()))?;
        let total_count = u32::try_from(all_jobs.len()).unwrap_or(u32::MAX);

        let jobs: Vec<JobInfo> = all_jobs
            .iter()
            .skip(offset)
            .take(page_size)
            .map(job_to_proto)
            .collect();

        let next_offset = offset + jobs.len();
        let next_page_token = if next_offset < all_jobs.len() {
            next_offset.to_string()
        } else {
            String::new()
        };

        Ok(Response::new(ListJobsResponse {
            jobs,
            next_page_token,
            total_count,
        }))
    }
}

/// An empty category selects every category.
fn category_filter(category: &str) -> Option<Category> {
    (!category.is_empty()).then(|| Category::new(category))
}

fn entry_to_proto(entry: ScheduleEntry) -> ScheduledJob {
    ScheduledJob {
        name: entry.name,
        category: entry.category.to_string(),
    }
}

fn job_to_proto(job: &Job) -> JobInfo {
    JobInfo {
        id: job.id.0,
        name: job.name.clone(),
        priority: job.priority.rank() as u32,
        dependency: job.dependency.map(|d| d.0),
        category: job.category.to_string(),
        submitted_at_ms: job.submitted_at,
    }
}
