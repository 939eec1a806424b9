pub mod config;
pub mod logging;

pub mod bulk;
pub mod control;
pub mod emulator;
pub mod filter;
pub mod mutation;
pub mod reader;
pub mod retry;
pub mod row;
pub mod rowset;
pub mod scan;
pub mod status;
pub mod table;
pub mod transport;
pub mod write;
