use crate::output;

use std::sync::Arc;

use clap::Args;
use color_eyre::Result;

use driver_rpc::{RpcServer, TEMPLATE_EXECUTE_PATH};
use pipeline_driver::Driver;

/// Serve the executor plugin endpoint
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Port to listen on (default: config port, 8080)
    #[arg(long, short = 'p', value_name = "PORT")]
    pub port: Option<u16>,
}

pub async fn execute(args: ServeArgs, driver: Arc<Driver>) -> Result<()> {
    let mut server = RpcServer::new(driver.clone());
    let port = args.port.unwrap_or(driver.config().port);
    server = server.with_port(port);

    output::status("Serving", &format!("POST :{}{}", port, TEMPLATE_EXECUTE_PATH));
    server.start().await?;
    Ok(())
}
