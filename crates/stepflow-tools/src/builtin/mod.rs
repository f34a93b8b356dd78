pub mod basic;
pub mod review;
