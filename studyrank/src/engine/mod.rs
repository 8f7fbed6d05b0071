pub mod fraud;
pub mod scoring;
pub mod streak;
