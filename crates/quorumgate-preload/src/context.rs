use std::sync::OnceLock;

use interceptor::Gate;
use quorumgate_core::config::Config;
use quorumgate_core::GateError;

use interceptor::guard::{self, Entry};
use crate::originals::Originals;

const SUMMARY_TARGET: &str = "quorumgate::summary";

/// Process-wide gate state: resolved originals first, then the gate itself.
///
/// The two stages are separate so that calls issued while the gate is being
/// built (config reads, log output) can already reach the originals.
struct Context {
    gate: Gate,
    json_summary: bool,
}

static ORIGINALS: OnceLock<Result<Originals, GateError>> = OnceLock::new();
static CONTEXT: OnceLock<Context> = OnceLock::new();

#[used]
#[link_section = ".init_array"]
static ATTACH: extern "C" fn() = attach;

extern "C" fn attach() {
    let Entry::Fresh(_guard) = guard::enter() else {
        return;
    };
    originals();
    context();
    // SAFETY: registers a plain extern "C" fn with no captured state.
    unsafe {
        libc::atexit(detach);
    }
}

extern "C" fn detach() {
    let Entry::Fresh(_guard) = guard::enter() else {
        return;
    };
    let Some(context) = CONTEXT.get() else {
        return;
    };
    let Some(summary) = context.gate.stats().finalize() else {
        return;
    };
    if context.json_summary {
        tracing::info!(target: SUMMARY_TARGET, "{}", reporting::json::render_json(&summary));
    } else {
        tracing::info!(target: SUMMARY_TARGET, "\n{}", summary.human_summary());
    }
}

/// Originals for every hooked symbol. A missing symbol aborts the process:
/// there is no safe way to serve the call without it.
pub fn originals() -> &'static Originals {
    match ORIGINALS.get_or_init(Originals::resolve) {
        Ok(originals) => originals,
        Err(err) => fatal(err),
    }
}

/// The gate, built on first use. Callers must hold the re-entrancy guard.
pub fn gate() -> &'static Gate {
    &context().gate
}

/// The gate if it has already been built.
pub fn gate_if_ready() -> Option<&'static Gate> {
    CONTEXT.get().map(|context| &context.gate)
}

fn context() -> &'static Context {
    CONTEXT.get_or_init(|| {
        let (config, load_error) = match Config::resolve(None) {
            Ok(config) => (config, None),
            Err(err) => {
                let mut config = Config::default_config();
                let _ = config.apply_env_overrides();
                (config, Some(err))
            }
        };
        interceptor::logging::init_tracing(&config.logging);
        if let Some(err) = load_error {
            tracing::warn!(error = %format!("{err:#}"), "config rejected, using built-in rules");
        }
        Context {
            gate: Gate::from_config(&config),
            json_summary: config.logging.json,
        }
    })
}

fn fatal(err: &GateError) -> ! {
    let message = format!("quorumgate: {err}; aborting\n");
    // SAFETY: raw write(2) to stderr, bypassing the unresolved wrappers.
    unsafe {
        libc::syscall(
            libc::SYS_write,
            libc::STDERR_FILENO,
            message.as_ptr(),
            message.len(),
        );
    }
    std::process::abort()
}
