pub mod action;
pub mod app;
pub mod events;
pub mod terminal;

pub use action::{ParseError, UserAction, HELP_TEXT};
pub use app::App;
pub use events::UiEvent;
pub use terminal::{render_events, spawn_input_reader, Renderer};
