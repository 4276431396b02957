pub mod error;
mod models;
mod node;
pub mod path;
pub mod pipe;
pub mod stream;

pub use crate::models::FileInfo;
pub use crate::node::Node;
pub use crate::path::normalize as normalize_path;
pub use crate::pipe::{
    CompressedPipe, Compression, FilePipe, MemoryPipe, Pipe, PreloadedPipe, SubPipe, ZipMethod, ZipPipe, sub_pipe,
    zip_entries,
};
pub use crate::stream::Stream;
use std::sync::Arc;

pub type PipeHandle = Arc<dyn Pipe>;
