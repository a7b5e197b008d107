#[path = "../common/mod.rs"]
mod common;

mod posts;
mod regenerate;
mod web;
