pub mod clone;
pub mod dns;
pub mod inventory;
pub mod servers;
pub mod storage;
