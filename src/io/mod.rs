/// CSV export of the results store.
pub mod export;
