/// Helpers shared across resource modules and the CLI
pub mod cidr;
pub mod fs;
pub mod ssh;
