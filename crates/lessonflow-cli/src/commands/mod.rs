pub mod convert;
pub mod init;
pub mod play;
pub mod stats;
pub mod validate;
