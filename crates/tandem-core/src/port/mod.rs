mod inspector;
#[cfg(test)]
mod mock;
mod reclaimer;

pub use inspector::{PortInspector, SystemPortInspector};
#[cfg(test)]
pub(crate) use mock::MockPortInspector;
pub use reclaimer::{PortReclaimer, ReclaimError, ReclaimReport};
