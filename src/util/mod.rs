//! Utility modules

pub mod paths;

pub use paths::{
    config_path, data_dir, ensure_log_file_path, init_data_dir, log_file_path, logs_dir,
};
