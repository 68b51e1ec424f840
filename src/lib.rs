// Library for tests and the binary to access modules

pub mod config;
pub mod docker_repo;
pub mod maintenance_worker;
pub mod models;
pub mod notify;
pub mod routes;
pub mod scanner;
pub mod store;
pub mod version;
