pub mod config;
pub mod error;
pub mod events;
pub mod export;
pub mod session;
pub mod processing {
    pub mod layout;
}
pub mod render {
    pub mod composite;
}
pub mod tasks {
    pub mod loader;
    pub mod session;
}
