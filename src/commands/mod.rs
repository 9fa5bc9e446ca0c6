pub mod cleaning;
pub mod client_ids;
pub mod date_ops;
pub mod inspection;
pub mod storage_paths;
pub mod transfer;
