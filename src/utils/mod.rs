pub mod hub;
pub mod process;
pub mod shutdown;

pub use hub::{Hub, HubState, HubStopped, is_clean_stop};
pub use process::{FnProcess, Process};
pub use shutdown::{ShutdownSignal, spawn_signal_handler, wait_for_signal};
