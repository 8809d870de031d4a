mod base;
mod implementations;
mod types;

pub use base::ProcessManager;
#[cfg(test)]
pub(crate) use implementations::MockProcessManager;
pub use implementations::SystemProcessManager;
#[cfg(unix)]
pub use implementations::UnixProcessManager;
#[cfg(windows)]
pub use implementations::WindowsProcessManager;
pub use types::{BoxStream, CommandSpec, ProcId, Spawned};
