// worldmesh shared - support code for the map decoding crates

pub mod log;
pub mod util;
