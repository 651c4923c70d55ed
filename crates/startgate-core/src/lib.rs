//! Readiness gate for container startup.
//!
//! Parses a connection string into a host and port, then polls a liveness
//! probe against it a bounded number of times before letting startup
//! continue, whether or not the dependency ever answered.

pub mod descriptor;
pub mod error;
pub mod gate;
pub mod probe;

pub use descriptor::{default_port_for, ConnectionDescriptor, PortSource, DEFAULT_PORT};
pub use error::ProbeError;
pub use gate::{
    GateEvent, GateOutcome, NullReporter, ReadinessGate, Reporter, RetryPolicy, Sleeper,
    TokioSleeper,
};
pub use probe::{CommandProbe, Probe, TcpProbe};
