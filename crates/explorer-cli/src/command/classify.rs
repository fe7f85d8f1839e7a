use clap::Args;
use explorer_query::classify;

use crate::core::Error;

#[derive(Args, Clone)]
pub struct ClassifyCommandParameters {
    /// Raw search input
    pub input: String,
}

pub fn command_classify(params: ClassifyCommandParameters) -> Result<(), Error> {
    let classification = classify(&params.input);

    let output = serde_json::to_string_pretty(&classification).map_err(|e| Error::Execution(e.to_string()))?;
    println!("{}", output);

    Ok(())
}
