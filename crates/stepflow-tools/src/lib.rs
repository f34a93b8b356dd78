pub mod builtin;
pub mod fallback;
pub mod registry;

pub use fallback::DefaultFallback;
pub use registry::ToolRegistry;
