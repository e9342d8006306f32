pub mod api;
pub mod error;
pub mod handlers;
pub mod template;

pub use api::{execute_template, RpcServer, TEMPLATE_EXECUTE_PATH};
pub use error::{RpcError, RpcResult};
pub use handlers::TemplateHandler;
pub use template::{ExecuteTemplateArgs, ExecuteTemplateReply, Parameter};

// Re-export types needed by clients
pub use pipeline_driver;
