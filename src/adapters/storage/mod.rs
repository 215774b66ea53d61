pub mod snapshot_store;
