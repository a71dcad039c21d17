pub mod utils;

mod api;
mod assignments;
mod attendance;
mod scope;
mod sessions;
