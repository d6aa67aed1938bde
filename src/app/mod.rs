mod orchestrator;
mod runtime;
mod shutdown;
mod startup;
mod types;

#[cfg(test)]
mod tests;

pub use orchestrator::{HiitOrchestrator, Services};
pub use types::{ComponentState, ShutdownReason};
