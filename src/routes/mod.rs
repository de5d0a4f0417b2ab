pub mod accounts;
pub mod pages;
pub mod posts;
