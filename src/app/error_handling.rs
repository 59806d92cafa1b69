//! Error handling utilities

use crate::error::{PipelineError, EXIT_GENERAL};
use tracing::error;

/// Exit code for a fatal error: the pipeline taxonomy when the chain holds a
/// `PipelineError`, otherwise the general failure code
pub fn exit_code_for(error: &anyhow::Error) -> i32 {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<PipelineError>())
        .map(PipelineError::exit_code)
        .unwrap_or(EXIT_GENERAL)
}

/// Handle fatal errors and exit with appropriate status code
///
/// - `verbose = 0`: the error message only
/// - `verbose >= 1`: the full error chain
pub fn handle_fatal_error(error: anyhow::Error, verbose: u8) -> ! {
    error!("Fatal error: {:#}", error);

    eprintln!("Error: {error:#}");
    if verbose >= 1 {
        eprintln!("\nError chain:");
        for (i, cause) in error.chain().enumerate() {
            eprintln!("  {}: {}", i, cause);
        }
    }

    std::process::exit(exit_code_for(&error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EXIT_CONFIG, EXIT_DEPENDENCY};
    use anyhow::Context;

    #[test]
    fn test_exit_code_from_pipeline_error() {
        let err = anyhow::Error::new(PipelineError::Config("bad".into()));
        assert_eq!(exit_code_for(&err), EXIT_CONFIG);
    }

    #[test]
    fn test_exit_code_through_context() {
        let result: std::result::Result<(), PipelineError> =
            Err(PipelineError::dependency("isf.txt", "/work"));
        let err = result.context("Run failed").unwrap_err();
        assert_eq!(exit_code_for(&err), EXIT_DEPENDENCY);
    }

    #[test]
    fn test_other_errors_are_general() {
        assert_eq!(exit_code_for(&anyhow::anyhow!("boom")), EXIT_GENERAL);
    }
}
