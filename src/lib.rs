pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod render;
pub mod platform {
    pub mod root_window;
}
pub mod tasks {
    pub mod controller;
    pub mod supervisor;
    pub mod touch;
    pub mod unifier;
    pub mod viewer;
}
