pub mod clock;
pub mod dir;
pub mod hash;
pub mod logging;
pub mod runtime;
pub mod time;
