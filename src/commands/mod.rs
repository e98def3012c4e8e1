pub mod changelog;
pub mod client;
pub mod manifest;
pub mod poll;
