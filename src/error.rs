use thiserror::Error;

/// Everything that can go wrong inside the PIC core.
///
/// Geometry and configuration errors are fatal at startup. A
/// `CorruptedState` aborts the whole timestep: nothing is committed to the
/// particle list when it is returned.
#[derive(Debug, Error)]
pub enum PicError {
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("corrupted state in species '{species}' (particle {index}, task {task}): {detail}")]
    CorruptedState {
        species: String,
        index: usize,
        task: usize,
        detail: String,
    },

    #[error("checkpoint record does not match the configured geometry: {0}")]
    CheckpointMismatch(String),

    #[error("mover requires the '{0}' field but it was not supplied")]
    MissingField(&'static str),

    #[error("checkpoint stream failed")]
    Io(#[from] std::io::Error),
}
