mod api;
mod change;
mod config;
mod error;
mod mapper;
mod poller;
mod registry;
mod scheduler;
mod session;
mod types;

pub use api::{ApiClient, LoginResponse, TOKEN_HEADER};
pub use change::ChangeDetector;
pub use config::{Config, Credentials, DEFAULT_BASE_URL};
pub use error::{Error, Result};
pub use mapper::{display_name, map_readings};
pub use poller::{CycleReport, Poller, PollerBuilder};
pub use registry::{MANUFACTURER, Registry, RegistryReconciler, identity_key};
pub use scheduler::{PollCycle, PollScheduler, SchedulerState, backoff_delay};
pub use session::SessionManager;
pub use types::*;
