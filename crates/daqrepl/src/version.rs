/// daqrepl version from Cargo.toml
pub const DAQREPL_VERSION: &str = env!("CARGO_PKG_VERSION");
