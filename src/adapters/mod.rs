pub mod api;
pub mod memory;
pub mod replay;
pub mod rtdb;
pub mod source;
