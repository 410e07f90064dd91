//! Everything that talks the CGD1's proprietary GATT protocol: the session,
//! device discovery, and the fixed-layout wire codecs.

pub mod alarm;
pub mod constants;
pub mod ringtone;
mod scanner;
mod session;
pub mod settings;
pub mod types;

pub use session::Session;
