pub mod at_cmd;
pub mod config;
pub mod crc;
pub mod data;
pub mod data_log;
pub mod error;
pub mod gauge;
pub mod lora_link;
pub mod node_task;
pub mod payload;
pub mod serial_port;
