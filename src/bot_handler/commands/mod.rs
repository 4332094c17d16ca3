pub mod current_repo;
pub mod help;
pub mod login;
pub mod logout;
pub mod menu;
pub mod preview;
pub mod select_repo;
pub mod start;
