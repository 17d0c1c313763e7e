use xcrit_core::OmegaPolicy;
use xcrit_runtime::Orchestrator;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }

    /// Omega tunables the running orchestrator blends with.
    pub fn omega_policy(&self) -> OmegaPolicy {
        self.orchestrator.settings().omega
    }
}
