// Common test utilities

use std::sync::Arc;

use export_core::domains::export::actions;
use export_core::domains::export::testing::{
    test_deps, MemoryBlobPublisher, StaticEvidenceProvider,
};
use export_core::kernel::jobs::InMemoryExportJobStore;
use export_core::kernel::ExportDeps;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

pub struct Harness {
    pub deps: ExportDeps,
    pub store: Arc<InMemoryExportJobStore>,
    pub provider: Arc<StaticEvidenceProvider>,
    pub publisher: Arc<MemoryBlobPublisher>,
    pub queue_rx: UnboundedReceiver<Uuid>,
    pub organization_id: Uuid,
    pub framework_id: Uuid,
}

impl Harness {
    pub fn new(provider: StaticEvidenceProvider) -> Self {
        let provider = Arc::new(provider);
        let publisher = Arc::new(MemoryBlobPublisher::new());
        let (deps, store, queue_rx) = test_deps(provider.clone(), publisher.clone());

        Self {
            deps,
            store,
            provider,
            publisher,
            queue_rx,
            organization_id: Uuid::new_v4(),
            framework_id: Uuid::new_v4(),
        }
    }

    pub async fn submit(&self) -> Uuid {
        actions::create_export_job(
            &self.deps,
            self.organization_id,
            self.framework_id,
            "auditor@example.com",
        )
        .await
        .expect("job submission should succeed")
    }
}
