pub mod schedule_service;
pub mod server;

pub use schedule_service::ScheduleServiceImpl;
pub use server::GrpcServer;
