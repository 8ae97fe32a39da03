// Sender acceptor, receiver workers and the strategies they run.

mod builder;
mod receiver;
mod registry;
mod sender;
#[allow(non_snake_case)]
pub mod Strategy;

pub use builder::{
    layout_for, ReceiverBuilder, ReceiverConfig, SenderBuilder, SenderConfig, DEFAULT_ACCEPT_TIMEOUT,
    DEFAULT_ALARM_GRACE, DEFAULT_CONNECT_TIMEOUT, DEFAULT_DURATION, DEFAULT_IO_TIMEOUT,
    DEFAULT_MAX_CONNECTIONS, DEFAULT_MESSAGE_SIZE, DEFAULT_PORT, DEFAULT_THREADS,
};
pub use receiver::{Receiver, ReceiverReport};
pub use registry::{RegistryStats, SlotGuard, WorkerRegistry};
pub use sender::{Sender, SenderReport};
