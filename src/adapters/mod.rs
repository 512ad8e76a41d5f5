// Adapters layer: concrete implementations of the domain ports for the
// outside world (albatross over HTTP, SSH/SCP, MySQL, the local disk).

pub mod albatross;
pub mod gzip;
pub mod mysql;
pub mod scp;
pub mod storage;

pub use albatross::AlbatrossClient;
pub use mysql::MysqlAdmin;
pub use scp::ScpFetcher;
pub use storage::LocalStorage;
