pub mod advisor;
pub mod assembler;
pub mod decoder;
pub mod openai;
pub mod prompt;
pub mod provider;
pub mod review;
pub mod stream;
pub mod transcript;

pub use assembler::{drive_stream, AssemblerState, Callbacks, StreamHandler, StreamingAssembler};
pub use provider::{LlmProvider, ProviderError};
pub use stream::{StreamErrorKind, StreamEvent};
