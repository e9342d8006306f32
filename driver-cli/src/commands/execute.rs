use crate::output;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use color_eyre::Result;

use driver_rpc::{ExecuteTemplateArgs, TemplateHandler};
use pipeline_driver::Driver;

/// Run one template request from a JSON file
#[derive(Args, Debug)]
pub struct ExecuteArgs {
    /// Path to the template.execute request body
    pub request: PathBuf,

    /// Namespace file override (default: service account namespace)
    #[arg(long, value_name = "FILE")]
    pub namespace_file: Option<PathBuf>,
}

pub async fn execute(args: ExecuteArgs, driver: Arc<Driver>) -> Result<()> {
    if !args.request.exists() {
        color_eyre::eyre::bail!("Request file not found: {}", args.request.display());
    }
    let content = std::fs::read_to_string(&args.request)?;
    let request: ExecuteTemplateArgs = serde_json::from_str(&content)?;

    let mut handler = TemplateHandler::new(driver);
    if let Some(path) = args.namespace_file {
        handler = handler.with_namespace_file(path);
    }

    output::status("Executing", &format!("{}", args.request.display()));
    match handler.execute(&request).await {
        Ok(reply) => {
            output::success(&reply.node.message);
            if let Some(outputs) = &reply.node.outputs {
                for parameter in &outputs.parameters {
                    output::parameter(&parameter.name, &parameter.value_text());
                }
            }
            println!("{}", serde_json::to_string_pretty(&reply)?);
            Ok(())
        }
        Err(e) => {
            output::error(&e.to_string());
            std::process::exit(1);
        }
    }
}
