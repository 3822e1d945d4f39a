use thiserror::Error;

use crate::analysis::AnalysisError;
use crate::model::{CompletionError, LevelError, PlayerError};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Completion(#[from] CompletionError),
    #[error(transparent)]
    Level(#[from] LevelError),
    #[error(transparent)]
    Player(#[from] PlayerError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}
