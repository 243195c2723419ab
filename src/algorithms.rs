pub mod components;
pub mod ktruss;
pub mod verify;
