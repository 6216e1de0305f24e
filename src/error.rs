use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("mount element '#{0}' not found")]
    MountNotFound(String),
    #[error("logic already initialised")]
    AlreadyInitialized,
    #[error("logic not initialised; call init_logic first")]
    NotInitialized,
    #[error("failed to patch DOM: {0}")]
    Patch(#[from] anyhow::Error),
}
