#[cfg(feature = "bluetooth")]
pub mod client;
pub mod protocol;
#[cfg(feature = "bluetooth")]
pub mod scanner;
