pub mod activity;
pub mod attachment;
pub mod config;
pub mod document;
pub mod user;

pub use activity::*;
pub use attachment::*;
pub use config::*;
pub use document::*;
pub use user::*;
