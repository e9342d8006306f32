pub mod template_handler;

pub use template_handler::{output_parameters, TemplateHandler, DRIVER_PLUGIN_NAME};
