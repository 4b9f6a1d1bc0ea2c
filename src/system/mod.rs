pub mod audio;
mod availability;
