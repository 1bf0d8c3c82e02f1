pub mod handler;
pub mod input;
pub mod registry;
pub mod schema;
pub mod tool;

pub use handler::{AsyncFnHandler, FnHandler, ToolHandler};
pub use input::ToolInput;
pub use registry::ToolRegistry;
pub use schema::{Field, FieldType, InputSchema, ObjectSchema};
pub use tool::{Tool, ToolBuilder};
