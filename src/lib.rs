pub mod apply; // render-time consumer of stored dispositions
pub mod batch; // concurrent, resumable batch review
pub mod config;
pub mod elements; // document element stream (external collaborator format)
pub mod extract; // draft-table reconstruction + content identity
pub mod ops; // operations facade for the CLI/automation collaborator
pub mod report; // read-only statistics
pub mod review; // ReviewerPort and its adapters
pub mod source; // element-stream port + JSON-file implementation
pub mod store; // correction records, persistence, migration
pub mod validate; // review state-machine invariants

use tracing_subscriber::EnvFilter;

/// Initialize tracing for binaries embedding the engine. Safe to call more
/// than once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();
}
