pub mod angle;
pub mod command_channel;
pub mod config;
pub mod dome_geometry;
pub mod dome_model;
pub mod error;
pub mod mock_controller;
pub mod mount_cmd;
pub mod mount_cmd_regex;
pub mod mount_model;
pub mod mount_status;
pub mod pointing;
pub mod sidereal;
