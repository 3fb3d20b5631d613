use std::net::SocketAddr;
use std::path::PathBuf;
use std::thread;

use clap::Parser;

use crate::errors::{EnhanceError, Result};

#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Server bind address
    #[arg(long, default_value = "127.0.0.1:5000")]
    pub bind: String,

    /// Pretrained generator (ONNX)
    #[arg(short, long, default_value = "AI-model/generator.onnx")]
    pub model_path: PathBuf,

    #[arg(long, default_value = "static/uploads")]
    pub upload_dir: PathBuf,

    #[arg(long, default_value = "static/generated")]
    pub generated_dir: PathBuf,

    #[arg(short, long, default_value_t = 0)]
    pub device_id: i32,

    /// ONNX Runtime intra-op threads
    #[arg(long, default_value_t = thread::available_parallelism().map_or(1, |n| n.get()))]
    pub intra_threads: usize,

    #[arg(long, default_value_t = 16 * 1024 * 1024)]
    pub max_upload_bytes: usize,

    /// Used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.bind
            .parse()
            .map_err(|e| EnhanceError::Configuration {
                message: format!("invalid bind address {}: {}", self.bind, e),
            })
    }

    pub fn validate(&self) -> Result<()> {
        self.bind_addr()?;

        if !self.model_path.is_file() {
            return Err(EnhanceError::Configuration {
                message: format!("model file not found: {}", self.model_path.display()),
            });
        }
        if self.intra_threads == 0 {
            return Err(EnhanceError::Configuration {
                message: "intra-threads must be at least 1".to_string(),
            });
        }
        if self.max_upload_bytes == 0 {
            return Err(EnhanceError::Configuration {
                message: "max-upload-bytes must be positive".to_string(),
            });
        }
        Ok(())
    }
}
