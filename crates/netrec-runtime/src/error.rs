use netrec_reconcile::{ApprovalError, ControllerError};
use netrec_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Scope discovery needs the store; without it there is nothing to fan out.
    #[error("could not derive device scope from the snapshot store: {0}")]
    Scope(#[source] StoreError),
    #[error(transparent)]
    Approval(#[from] ApprovalError),
    #[error(transparent)]
    Controller(#[from] ControllerError),
    #[error("audit log: {0:#}")]
    Audit(anyhow::Error),
    #[error("worker for {entity_kind}/{hostname} did not finish: {message}")]
    Worker {
        entity_kind: String,
        hostname: String,
        message: String,
    },
}

impl From<anyhow::Error> for RunError {
    fn from(e: anyhow::Error) -> Self {
        RunError::Audit(e)
    }
}
