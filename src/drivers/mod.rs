//! Drivers de hardware e a abstração de dispositivo.

pub mod console;
pub mod device;
pub mod keyboard;
pub mod pic;
pub mod serial;
pub mod timer;
pub mod tty;

#[cfg(feature = "self_test")]
pub mod test;
