pub mod channel;
pub mod dom;
pub mod loopback;
