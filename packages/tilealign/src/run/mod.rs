pub mod partition;
pub mod worker;
pub mod worker_pool;
