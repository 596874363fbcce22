//! Read access to flow definitions.

use crate::definition::Flow;
use crate::error::StoreError;
use crate::trigger::TriggerKind;
use async_trait::async_trait;
use encore_core::{FlowId, WorkspaceId};

/// Source of flow definitions.
///
/// Flows are owned by the workspace and edited elsewhere; the engine only
/// reads them, and reads them afresh on every advance.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Loads a flow by id.
    async fn get_flow(&self, flow_id: FlowId) -> Result<Option<Flow>, StoreError>;

    /// Lists the flows of a workspace whose trigger is of the given kind.
    ///
    /// Disabled flows are included; the engine reports them as skipped.
    async fn find_flows(
        &self,
        workspace_id: WorkspaceId,
        kind: TriggerKind,
    ) -> Result<Vec<Flow>, StoreError>;
}
