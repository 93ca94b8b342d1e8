pub mod common;
pub mod promotion;
pub mod subscription;
pub mod transition;
pub mod user;
