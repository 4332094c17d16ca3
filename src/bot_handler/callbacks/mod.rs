pub mod repos_page;
pub mod select_branch;
pub mod select_repo;
