pub mod vault;

pub use vault::VaultSink;
