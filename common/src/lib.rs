pub mod config;
pub mod engine;
pub mod fs;
pub mod job;
pub mod kv;
pub mod maxtemp;
pub mod partitioner;
pub mod results;
pub mod script;
pub mod task;
pub mod wordcount;
pub mod worker;

pub use job::*;
pub use kv::{Key, KeyValue};
pub use results::*;
pub use task::*;
pub use worker::*;
