pub mod cors;
pub mod metrics;
pub mod tracing;

pub use self::cors::{permissive_cors, preflight_middleware};
pub use self::metrics::metrics_middleware;
pub use self::tracing::{REQUEST_ID_HEADER, request_id_middleware};
