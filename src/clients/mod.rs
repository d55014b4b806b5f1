pub mod embedder;

pub use embedder::EmbedderClient;
