pub mod mock_mount;
pub mod mount_state;
