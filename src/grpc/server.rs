use std::net::SocketAddr;

use tokio_util::sync::CancellationToken;
use tonic::transport::Server;

use crate::grpc::schedule_service::ScheduleServiceImpl;
use crate::proto::schedule_service_server::ScheduleServiceServer;

pub struct GrpcServer {
    addr: SocketAddr,
    service: ScheduleServiceImpl,
}

impl GrpcServer {
    pub fn new(addr: SocketAddr, service: ScheduleServiceImpl) -> Self {
        Self { addr, service }
    }

    /// Serve until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), tonic::transport::Error> {
        tracing::info!(addr = %self.addr, "Starting gRPC server");

        Server::builder()
            .add_service(ScheduleServiceServer::new(self.service))
            .serve_with_shutdown(self.addr, shutdown.cancelled_owned())
            .await
    }
}
