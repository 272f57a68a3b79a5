pub mod delivery;
pub mod dispatcher;
pub mod monitor;

pub use delivery::LinkDelivery;
pub use dispatcher::{
    DeliveryQueue, DeliveryReport, Dispatcher, DispatcherInputs, Disposition, JobSubmitter, Submission,
};
pub use monitor::ConnectionMonitor;
