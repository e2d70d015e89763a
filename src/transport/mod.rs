pub mod traits;
pub mod udp;

#[cfg(test)]
pub mod memory;

pub use traits::DatagramChannel;
pub use udp::UdpChannel;
