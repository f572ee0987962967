pub mod api;
pub mod config;
pub mod error;
pub mod grpc;
pub mod intake;
pub mod node;
pub mod queue;
pub mod scheduler;
pub mod shutdown;

// Re-export generated protobuf types
pub mod proto {
    tonic::include_proto!("scheduler");
}
