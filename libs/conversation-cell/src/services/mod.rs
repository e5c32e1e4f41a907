pub mod flow;
pub mod nlu;
pub mod store;
