//! CLI-level errors (wraps infrastructure errors)

use thiserror::Error;

use crate::application::ApplicationError;
use crate::domain::DomainError;
use crate::exitcode;
use crate::infrastructure::InfraError;

/// CLI errors are the top-level error type.
/// These are what get displayed to the user.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Infra(#[from] InfraError),

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("{0}")]
    Usage(String),
}

impl From<ApplicationError> for CliError {
    fn from(e: ApplicationError) -> Self {
        CliError::Infra(InfraError::Application(e))
    }
}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

impl CliError {
    /// Get the appropriate exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::InvalidArgs(_) | CliError::Usage(_) => exitcode::USAGE,
            CliError::Infra(e) => match e {
                InfraError::Io { .. } => exitcode::IOERR,
                InfraError::Fixture { .. } => exitcode::DATAERR,
                InfraError::Application(app) => match app {
                    ApplicationError::Config { .. } => exitcode::CONFIG,
                    ApplicationError::StaleReference(_) => exitcode::NOINPUT,
                    ApplicationError::Domain(DomainError::KindNotInSchema(_)) => exitcode::USAGE,
                    _ => exitcode::SOFTWARE,
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EntityKind;

    #[test]
    fn given_kind_outside_schema_when_mapping_exit_code_then_usage() {
        let err = CliError::from(ApplicationError::Domain(DomainError::KindNotInSchema(
            EntityKind::Job,
        )));
        assert_eq!(err.exit_code(), exitcode::USAGE);
    }

    #[test]
    fn given_bad_dataset_when_mapping_exit_code_then_dataerr() {
        let err = CliError::from(InfraError::Fixture {
            message: "component 1 references missing project 2".into(),
        });
        assert_eq!(err.exit_code(), exitcode::DATAERR);
    }
}
