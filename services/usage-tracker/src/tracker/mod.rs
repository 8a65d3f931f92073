pub mod gate;
pub mod tasks;

pub use gate::InputGate;
pub use tasks::{
    limit_message, start_change_listener, start_limit_notifier, start_sweep_task,
    sweep_and_reconcile,
};
