use std::io;
use std::time::Duration;

use thiserror::Error;

/// Why a single liveness probe did not report ready.
///
/// The gate treats every variant as "not ready yet"; none of them abort startup.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("descriptor has no host to probe")]
    MissingHost,

    #[error("connection to {target} failed: {source}")]
    Connect {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("no answer from {target} within {}ms", .timeout.as_millis())]
    Timeout { target: String, timeout: Duration },

    #[error("failed to run probe command `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("probe command `{program}` reported not ready ({status})")]
    NotReady { program: String, status: String },
}
