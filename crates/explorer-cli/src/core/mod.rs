use thiserror::Error;

pub mod configuration;
pub mod tracing;

#[derive(Error, Debug)]
pub enum Error {
    #[error("CLI configuration error: {0}")]
    Configuration(String),

    #[error("CLI execution error: {0}")]
    Execution(String),
}
