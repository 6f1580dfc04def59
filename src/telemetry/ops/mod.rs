pub mod init;
pub mod poll;
pub mod source;
