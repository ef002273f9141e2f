//! Core orchestration: scheduling, probing, aggregation, and the main
//! cycle loop. Depends only on the domain and application layers; nothing
//! here knows how results are stored or how probes actually speak wire
//! protocols.

pub mod aggregator;
pub mod clock;
pub mod cycle_controller;
pub mod executor;
pub mod scheduler;
pub mod whois_worker;
pub mod worker_pool;

pub use clock::{FakeClock, SystemClock};
pub use cycle_controller::CycleController;
pub use executor::TestExecutor;
pub use scheduler::Scheduler;
pub use whois_worker::WhoisWorker;
pub use worker_pool::WorkerPool;
