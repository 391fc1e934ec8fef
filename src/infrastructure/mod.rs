//! Infrastructure layer: configuration, logging, disk stats, command-file
//! parsing and external tool invocation.

pub mod command_source;
pub mod config;
pub mod disk_guard;
pub mod external_tool;
pub mod logging;

pub use command_source::{load_command_file, CommandSourceError};
pub use config::{ConfigError, RetrieverConfig};
pub use disk_guard::{DiskGuard, FreeSpaceProbe, SysinfoProbe};
pub use external_tool::{ArsAdminInvoker, ExternalToolError, ToolInvoker, ToolOutput};
