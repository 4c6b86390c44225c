//! Client metrics.
//!
//! Static counters registered with the metriken global registry; hosts
//! that expose metriken (Prometheus exporters, admin ports) pick these
//! up without any wiring here.

use metriken::{Counter, metric};

#[metric(
    name = "cacheline/commands",
    description = "Total commands executed by the drain loop"
)]
pub static COMMANDS: Counter = Counter::new();

#[metric(
    name = "cacheline/connect_failures",
    description = "Connection attempts that failed during a connect cycle"
)]
pub static CONNECT_FAILURES: Counter = Counter::new();

#[metric(
    name = "cacheline/connections_dropped",
    description = "Connections discarded after an error or EOF"
)]
pub static CONNECTIONS_DROPPED: Counter = Counter::new();

#[metric(
    name = "cacheline/protocol_errors",
    description = "Exchanges aborted by malformed responses"
)]
pub static PROTOCOL_ERRORS: Counter = Counter::new();
