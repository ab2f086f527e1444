pub mod ask;
pub mod doctor;
pub mod route;
pub mod search;
pub mod serve;
pub mod tiers;
