pub mod config;
pub mod mediawiki;
pub mod pipeline;
pub mod replica;
pub mod report;

#[cfg(test)]
mod testing;
