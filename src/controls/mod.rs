mod bindings;
pub mod channel;
mod menu;
mod pipeline;

pub use bindings::BindingRegistry;
pub use menu::MenuView;
pub use pipeline::{ChannelInput, WorkerSettings, spawn_channel_worker};
