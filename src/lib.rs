pub mod audio;
pub mod common;
pub mod configs;
pub mod player;
pub mod server;
pub mod sources;
pub mod voice;

#[cfg(test)]
mod testing;
