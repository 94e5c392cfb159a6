pub mod config;
pub mod coords;
pub mod input;
pub mod polygon;
pub mod time;
