//! Provider-agnostic gate pipeline.
//!
//! An interception provider turns a captured call into an
//! [`InterceptedCall`](quorumgate_core::InterceptedCall) and hands it to
//! [`Gate::check`]; the returned decision says whether to delegate to the
//! real implementation or fail with `EPERM`.

pub mod fd;
pub mod gate;
pub mod guard;
pub mod logging;
pub mod provider;
pub mod sockaddr;
pub mod stats;

pub use gate::{Gate, GateDecision};
pub use provider::{InterceptionProvider, LaunchRequest, Mechanism, PreloadProvider, ProviderRun};
pub use stats::Statistics;
