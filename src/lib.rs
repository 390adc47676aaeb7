pub mod cache;
pub mod config;
pub mod domain;
pub mod enrich;
pub mod error;
pub mod fs_util;
pub mod keywords;
pub mod literature;
pub mod merge;
pub mod output;
pub mod retriever;
pub mod retry;
pub mod topics;
