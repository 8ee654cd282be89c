//! Sample history, log files and setup files.

pub mod ring_buffer;
pub mod setup_file;
pub mod storage;

pub use ring_buffer::SampleHistory;
pub use setup_file::SetupDocument;
pub use storage::LogWriter;
