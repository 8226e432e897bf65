pub mod clock;
pub mod gateway;
pub mod identity;
pub mod processor;
pub mod query;
pub mod queue;
pub mod reconcile;
pub mod state;
pub mod storage;
pub mod worker;
