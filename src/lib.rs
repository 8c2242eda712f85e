pub mod app;
pub mod config;
pub mod demo_seeder;
pub mod error;
pub mod normalize;
pub mod slug;

pub mod api {
    pub mod admin;
    pub mod catalog;
    pub mod destinations;
    pub mod errors;
    pub mod listings;
    pub mod response;
    pub mod search;
    pub mod stories;
    pub mod testimonials;
}

pub mod auth {
    pub mod models;
    pub mod password;
    pub mod session;
}

pub mod db {
    pub mod memory;
    pub mod models;
    pub mod mongo;
    pub mod repository;
    pub mod stores;

    #[cfg(test)]
    pub mod testing;
}
