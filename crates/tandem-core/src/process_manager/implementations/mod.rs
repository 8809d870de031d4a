#[cfg(test)]
mod mock;
#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(test)]
pub(crate) use mock::MockProcessManager;
#[cfg(unix)]
pub use unix::UnixProcessManager;
#[cfg(windows)]
pub use windows::WindowsProcessManager;

#[cfg(unix)]
pub type SystemProcessManager = UnixProcessManager;
#[cfg(windows)]
pub type SystemProcessManager = WindowsProcessManager;
