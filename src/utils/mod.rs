//! Shared helpers: byte sniffing, bounded reads, atomic output and logging setup

pub mod io;
pub mod logging;

pub use self::{
    io::{has_header, read_bounded, read_file, write_atomic},
    logging::{init_logging, LogLevel},
};
