// Module naming follows project convention (Core, Transport, Metrics, Debug)
#[allow(non_snake_case)]
pub mod Core;
#[allow(non_snake_case)]
pub mod Transport;
#[allow(non_snake_case)]
pub mod Metrics;
#[allow(non_snake_case)]
pub mod Debug {
    pub mod StructDebug;
}

pub use Core::{Error, Result, Shutdown};
pub use Transport::Strategy::Strategy;
pub use Transport::{Receiver, ReceiverBuilder, Sender, SenderBuilder};
