use crate::error::EngineError;
use anyhow::{Context, Result};
use std::path::Path;

/// Fails with `EngineError::MissingInput` when a required upstream artifact is absent.
/// `hint` names the step that produces it.
pub fn ensure_input_file(path: &Path, hint: &str) -> Result<()> {
    if path.is_file() {
        return Ok(());
    }

    Err(EngineError::MissingInput {
        path: path.to_path_buf(),
    })
    .with_context(|| format!("{} not found. {}", path.display(), hint))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_is_typed() {
        let dir = tempdir().unwrap();
        let err = ensure_input_file(&dir.path().join("absent.csv"), "Run `backtest` first.")
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::MissingInput { .. })
        ));
        assert!(format!("{}", err).contains("Run `backtest` first."));
    }

    #[test]
    fn directories_do_not_count_as_inputs() {
        let dir = tempdir().unwrap();
        assert!(ensure_input_file(dir.path(), "").is_err());
    }
}
